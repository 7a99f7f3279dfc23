//! Report download handler.
//!
//! Mounted behind `require_report_access`; the file is opened only once the
//! caller has been authorized, so an unauthenticated caller cannot learn
//! whether the report exists.

use crate::auth::Claims;
use crate::errors::ReportError;
use crate::observability::metrics::record_report_download;
use crate::routes::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Media type of the served report.
pub const REPORT_CONTENT_TYPE: &str = "application/pdf";

/// Download name presented to the client.
pub const REPORT_FILENAME: &str = "report.pdf";

/// Handler for GET /reports
///
/// Streams the configured report file.
///
/// # Response
///
/// - 200 with `application/pdf` body and an attachment disposition
/// - 404 if the file does not exist
/// - 500 if the file exists but cannot be read
#[instrument(skip_all, name = "report.handlers.reports")]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ReportError> {
    let path = &state.config.report_file_path;

    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            record_report_download("not_found");
            return Err(ReportError::NotFound(REPORT_FILENAME.to_string()));
        }
        Err(e) => {
            tracing::error!(target: "report.handlers.reports", error = %e, "Failed to open report file");
            record_report_download("error");
            return Err(ReportError::Internal);
        }
    };

    // A missing length only drops the Content-Length header.
    let content_length = file.metadata().await.ok().map(|m| m.len());

    tracing::info!(
        target: "report.handlers.reports",
        azp = claims.azp.as_deref().unwrap_or("unknown"),
        bytes = content_length,
        "Serving report"
    );
    record_report_download("served");

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(REPORT_CONTENT_TYPE),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"report.pdf\""),
    );
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn claims() -> Claims {
        serde_json::from_value(serde_json::json!({
            "iss": "http://localhost:8080/realms/master",
            "aud": "report-frontend",
            "exp": 4_102_444_800_i64,
            "azp": "report-frontend",
            "realm_access": { "roles": ["admin"] }
        }))
        .unwrap()
    }

    fn state_with_file(path: PathBuf) -> Arc<AppState> {
        let vars = HashMap::from([
            ("KEYCLOAK_CLIENT_ID".to_string(), "report-frontend".to_string()),
            (
                "REPORT_FILE_PATH".to_string(),
                path.to_string_lossy().into_owned(),
            ),
        ]);
        Arc::new(AppState::from_config(Config::from_vars(&vars).unwrap()).unwrap())
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("report-handler-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_serves_file_with_pdf_headers() {
        let path = temp_path("present.pdf");
        std::fs::write(&path, b"%PDF-1.4 test body").unwrap();

        let response = get_report(State(state_with_file(path.clone())), Extension(claims()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "18");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"%PDF-1.4 test body");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let path = temp_path("absent.pdf");
        let _ = std::fs::remove_file(&path);

        let result = get_report(State(state_with_file(path)), Extension(claims())).await;

        assert!(matches!(result, Err(ReportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_internal() {
        // Opening a directory for reading succeeds on some platforms, so use a
        // path whose parent is a regular file instead.
        let parent = temp_path("not-a-dir");
        std::fs::write(&parent, b"x").unwrap();
        let path = parent.join("report.pdf");

        let result = get_report(State(state_with_file(path)), Extension(claims())).await;

        assert!(matches!(result, Err(ReportError::Internal)));
        std::fs::remove_file(&parent).unwrap();
    }
}
