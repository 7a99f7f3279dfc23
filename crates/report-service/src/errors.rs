//! Report service error types.
//!
//! Every authentication and authorization failure maps to 401 with a generic
//! `detail` string, so a client cannot tell which validation step rejected it.
//! The precise kind is logged server-side and recorded in metrics.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Client-facing detail for a request without a bearer credential.
pub const DETAIL_NOT_AUTHENTICATED: &str = "Not authenticated";

/// Client-facing detail for every other authentication/authorization failure.
pub const DETAIL_INVALID_CREDENTIALS: &str = "Could not validate credentials";

/// Client-facing detail when the backing report file is absent.
pub const DETAIL_REPORT_NOT_FOUND: &str = "Report file not found";

/// Report service error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated, MalformedToken, UnknownKey, SignatureInvalid,
///   ClaimInvalid, UpstreamUnavailable, NoRoles, RoleNotPermitted: 401
/// - NotFound: 404
/// - Internal: 500
///
/// `UpstreamUnavailable` fails closed as 401: from the caller's point of view
/// access was not granted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("No bearer credential presented")]
    Unauthenticated,

    #[error("Malformed token")]
    MalformedToken,

    #[error("No signing key matches the token key identifier")]
    UnknownKey,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token claims are invalid")]
    ClaimInvalid,

    #[error("Identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Token carries no roles")]
    NoRoles,

    #[error("Required role not held")]
    RoleNotPermitted,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl ReportError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReportError::NotFound(_) => StatusCode::NOT_FOUND,
            ReportError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable, bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Unauthenticated => "unauthenticated",
            ReportError::MalformedToken => "malformed_token",
            ReportError::UnknownKey => "unknown_key",
            ReportError::SignatureInvalid => "signature_invalid",
            ReportError::ClaimInvalid => "claim_invalid",
            ReportError::UpstreamUnavailable(_) => "upstream_unavailable",
            ReportError::NoRoles => "no_roles",
            ReportError::RoleNotPermitted => "role_not_permitted",
            ReportError::NotFound(_) => "not_found",
            ReportError::Internal => "internal",
        }
    }

    fn detail(&self) -> &'static str {
        match self {
            ReportError::Unauthenticated => DETAIL_NOT_AUTHENTICATED,
            ReportError::NotFound(_) => DETAIL_REPORT_NOT_FOUND,
            ReportError::Internal => "An internal error occurred",
            _ => DETAIL_INVALID_CREDENTIALS,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: &'static str,
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ReportError::UpstreamUnavailable(reason) => {
                tracing::warn!(target: "report.availability", reason = %reason, "Identity provider unavailable");
            }
            ReportError::NotFound(resource) => {
                tracing::warn!(target: "report.handlers.reports", resource = %resource, "Resource not found");
            }
            ReportError::Internal => {
                tracing::error!(target: "report.errors", "Internal error");
            }
            _ => {
                tracing::debug!(target: "report.errors", kind = self.kind(), "Request rejected");
            }
        }

        let mut response = (
            status,
            Json(ErrorResponse {
                detail: self.detail(),
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn auth_errors() -> Vec<ReportError> {
        vec![
            ReportError::Unauthenticated,
            ReportError::MalformedToken,
            ReportError::UnknownKey,
            ReportError::SignatureInvalid,
            ReportError::ClaimInvalid,
            ReportError::UpstreamUnavailable("connection refused".to_string()),
            ReportError::NoRoles,
            ReportError::RoleNotPermitted,
        ]
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        for error in auth_errors() {
            assert_eq!(
                error.status_code(),
                StatusCode::UNAUTHORIZED,
                "{:?} should map to 401",
                error
            );
        }
    }

    #[test]
    fn test_non_auth_status_codes() {
        assert_eq!(
            ReportError::NotFound("report".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ReportError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_upstream_unavailable() {
        let error = ReportError::UpstreamUnavailable("status 502".to_string());
        assert_eq!(
            format!("{}", error),
            "Identity provider unavailable: status 502"
        );
    }

    #[tokio::test]
    async fn test_into_response_unauthenticated() {
        let response = ReportError::Unauthenticated.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").unwrap(),
            "Bearer"
        );

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["detail"], DETAIL_NOT_AUTHENTICATED);
    }

    #[tokio::test]
    async fn test_token_failures_share_one_detail() {
        for error in auth_errors().into_iter().skip(1) {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let body_json = read_body_json(response.into_body()).await;
            assert_eq!(body_json["detail"], DETAIL_INVALID_CREDENTIALS);
        }
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = ReportError::NotFound("report.pdf".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["detail"], "Report file not found");
    }

    #[tokio::test]
    async fn test_into_response_internal() {
        let response = ReportError::Internal.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["detail"], "An internal error occurred");
    }
}
