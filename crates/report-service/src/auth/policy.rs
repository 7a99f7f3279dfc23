//! Role-based access policy for the protected report.
//!
//! Roles are read from `realm_access.roles`. Every configured role must be
//! held; the default configuration requires exactly one.

use crate::auth::claims::Claims;
use crate::errors::ReportError;
use std::collections::BTreeSet;

/// Why a verified caller was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// `realm_access.roles` absent or empty.
    NoRoles,
    /// At least one required role is not held.
    RoleNotPermitted,
}

impl From<DenialReason> for ReportError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::NoRoles => ReportError::NoRoles,
            DenialReason::RoleNotPermitted => ReportError::RoleNotPermitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Denied(DenialReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    required_roles: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn new(required_roles: BTreeSet<String>) -> Self {
        Self { required_roles }
    }

    /// Policy requiring a single role.
    pub fn require_role(role: &str) -> Self {
        Self::new(BTreeSet::from([role.to_string()]))
    }

    pub fn required_roles(&self) -> &BTreeSet<String> {
        &self.required_roles
    }

    pub fn authorize(&self, claims: &Claims) -> PolicyDecision {
        let roles = claims.realm_roles();
        if roles.is_empty() {
            tracing::debug!(target: "report.auth.policy", "Token carries no realm roles");
            return PolicyDecision::Denied(DenialReason::NoRoles);
        }

        let missing = self
            .required_roles
            .iter()
            .filter(|required| !roles.contains(*required))
            .count();
        if missing > 0 {
            tracing::debug!(
                target: "report.auth.policy",
                missing_roles = missing,
                "Required role not held"
            );
            return PolicyDecision::Denied(DenialReason::RoleNotPermitted);
        }

        PolicyDecision::Allowed
    }
}
