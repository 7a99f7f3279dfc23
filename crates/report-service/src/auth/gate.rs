//! Resource gate: bearer extraction, verification and policy in one decision.

use crate::auth::claims::Claims;
use crate::auth::jwt::TokenVerifier;
use crate::auth::policy::{AccessPolicy, PolicyDecision};
use crate::errors::ReportError;
use std::sync::Arc;
use tracing::instrument;

/// Terminal outcome of the authentication pipeline for one request.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    /// Token verified and policy satisfied.
    Authorized(Claims),

    /// Provably not allowed.
    Denied(ReportError),

    /// Could not be determined because the key set was unavailable.
    /// Fails closed like `Denied`.
    Indeterminate(ReportError),
}

impl AuthDecision {
    fn from_verification(result: Result<Claims, ReportError>, policy: &AccessPolicy) -> Self {
        match result {
            Ok(claims) => match policy.authorize(&claims) {
                PolicyDecision::Allowed => AuthDecision::Authorized(claims),
                PolicyDecision::Denied(reason) => AuthDecision::Denied(reason.into()),
            },
            Err(e @ ReportError::UpstreamUnavailable(_)) => AuthDecision::Indeterminate(e),
            Err(e) => AuthDecision::Denied(e),
        }
    }

    /// Bounded label for logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthDecision::Authorized(_) => "authorized",
            AuthDecision::Denied(_) => "denied",
            AuthDecision::Indeterminate(_) => "indeterminate",
        }
    }

    pub fn into_result(self) -> Result<Claims, ReportError> {
        match self {
            AuthDecision::Authorized(claims) => Ok(claims),
            AuthDecision::Denied(e) | AuthDecision::Indeterminate(e) => Err(e),
        }
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Decides whether a request may reach the protected report.
pub struct ResourceGate {
    verifier: Arc<TokenVerifier>,
    policy: AccessPolicy,
}

impl ResourceGate {
    pub fn new(verifier: Arc<TokenVerifier>, policy: AccessPolicy) -> Self {
        Self { verifier, policy }
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Evaluate the raw `Authorization` header value of a request.
    ///
    /// A missing or non-bearer credential is `Denied(Unauthenticated)` and
    /// never reaches the verifier.
    #[instrument(skip_all, name = "report.auth.gate.evaluate")]
    pub async fn evaluate(&self, authorization: Option<&str>) -> AuthDecision {
        let Some(token) = authorization.and_then(bearer_token) else {
            tracing::debug!(target: "report.auth.gate", "No bearer credential presented");
            return AuthDecision::Denied(ReportError::Unauthenticated);
        };

        let decision =
            AuthDecision::from_verification(self.verifier.verify(token).await, &self.policy);

        match &decision {
            AuthDecision::Authorized(_) => {
                tracing::debug!(target: "report.auth.gate", "Request authorized");
            }
            AuthDecision::Denied(e) => {
                tracing::info!(target: "report.auth.gate", reason = e.kind(), "Request denied");
            }
            AuthDecision::Indeterminate(e) => {
                tracing::warn!(target: "report.auth.gate", reason = e.kind(), "Authorization indeterminate, failing closed");
            }
        }

        decision
    }
}
