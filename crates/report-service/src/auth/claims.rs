//! Verified token claims.
//!
//! A `Claims` value only exists after signature and standard-claim validation.
//! Identity fields are redacted in Debug output to keep them out of logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `aud` claim, which identity providers emit as a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|a| a == audience),
        }
    }
}

/// Realm-scoped role assignments (`realm_access`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims of a verified token.
///
/// Standard and role claims are typed; every other claim is preserved in
/// `extra` so the full mapping remains available to handlers.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer URL.
    pub iss: String,

    /// Audience(s) the token was issued for.
    pub aud: Audience,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Subject - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Authorized party (the client the token was requested by).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Human-readable username - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Realm role assignments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,

    /// All remaining claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("azp", &self.azp)
            .field(
                "preferred_username",
                &self.preferred_username.as_ref().map(|_| "[REDACTED]"),
            )
            .field("realm_access", &self.realm_access)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl Claims {
    /// Realm roles, or an empty slice if the token carries none.
    pub fn realm_roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|access| access.roles.as_slice())
            .unwrap_or_default()
    }

    /// Check if the token holds a realm role.
    pub fn has_realm_role(&self, role: &str) -> bool {
        self.realm_roles().iter().any(|r| r == role)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keycloak_payload() -> serde_json::Value {
        json!({
            "iss": "http://localhost:8080/realms/master",
            "aud": ["report-frontend", "account"],
            "exp": 1_900_000_000,
            "iat": 1_899_999_700,
            "sub": "f1b2c3d4-secret-user",
            "azp": "report-frontend",
            "preferred_username": "alice",
            "scope": "openid profile",
            "realm_access": {"roles": ["admin", "offline_access"]}
        })
    }

    #[test]
    fn test_deserialize_keycloak_access_token() {
        let claims: Claims = serde_json::from_value(keycloak_payload()).unwrap();

        assert_eq!(claims.iss, "http://localhost:8080/realms/master");
        assert!(claims.aud.contains("report-frontend"));
        assert!(claims.aud.contains("account"));
        assert!(!claims.aud.contains("other"));
        assert_eq!(claims.realm_roles(), ["admin", "offline_access"]);
        assert_eq!(claims.extra.get("scope"), Some(&json!("openid profile")));
    }

    #[test]
    fn test_single_string_audience() {
        let mut payload = keycloak_payload();
        payload["aud"] = json!("report-frontend");

        let claims: Claims = serde_json::from_value(payload).unwrap();
        assert_eq!(claims.aud, Audience::One("report-frontend".to_string()));
        assert!(claims.aud.contains("report-frontend"));
    }

    #[test]
    fn test_missing_realm_access_means_no_roles() {
        let mut payload = keycloak_payload();
        payload.as_object_mut().unwrap().remove("realm_access");

        let claims: Claims = serde_json::from_value(payload).unwrap();
        assert!(claims.realm_roles().is_empty());
        assert!(!claims.has_realm_role("admin"));
    }

    #[test]
    fn test_realm_access_without_roles_array() {
        let mut payload = keycloak_payload();
        payload["realm_access"] = json!({});

        let claims: Claims = serde_json::from_value(payload).unwrap();
        assert!(claims.realm_roles().is_empty());
    }

    #[test]
    fn test_has_realm_role_is_exact_match() {
        let claims: Claims = serde_json::from_value(keycloak_payload()).unwrap();

        assert!(claims.has_realm_role("admin"));
        assert!(!claims.has_realm_role("adm"));
        assert!(!claims.has_realm_role("ADMIN"));
    }

    #[test]
    fn test_debug_redacts_identity() {
        let claims: Claims = serde_json::from_value(keycloak_payload()).unwrap();
        let debug_str = format!("{:?}", claims);

        assert!(!debug_str.contains("f1b2c3d4-secret-user"));
        assert!(!debug_str.contains("alice"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
