//! Authorization middleware for the protected report route.
//!
//! Runs the resource gate on the `Authorization` header and injects the
//! verified claims into request extensions. Handlers behind this layer only
//! run for authorized callers, so no resource state is observable before
//! authorization.

use crate::auth::{Claims, ResourceGate};
use crate::errors::ReportError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authorization middleware.
#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<ResourceGate>,
}

/// Require a bearer token that verifies and satisfies the access policy.
///
/// # Response
///
/// - 401 with `WWW-Authenticate: Bearer` if the credential is missing,
///   invalid, lacks the required role, or cannot be checked
/// - Otherwise continues with `Claims` in request extensions
#[instrument(skip(state, req, next), name = "report.middleware.auth")]
pub async fn require_report_access(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ReportError> {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let claims = state.gate.evaluate(authorization).await.into_result()?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extension trait for extracting claims from request.
pub trait ClaimsExt {
    /// Returns `None` if the auth middleware was not applied to this request.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for axum::extract::Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}
