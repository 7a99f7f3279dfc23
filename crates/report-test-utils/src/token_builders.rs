//! Builder patterns for test data construction
//!
//! Produces claims shaped like a Keycloak access token.

use crate::mock_idp::{MockIdentityProvider, TEST_CLIENT_ID};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for access token claims
///
/// Defaults to a valid admin token for the given issuer and audience.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::for_provider(&idp)
///     .with_roles(&["viewer"])
///     .expires_in(-60)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    iss: String,
    aud: Value,
    sub: String,
    azp: String,
    exp: i64,
    iat: i64,
    roles: Option<Vec<String>>,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a builder with explicit issuer and audience
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            aud: Value::String(audience.to_string()),
            sub: "test-subject".to_string(),
            azp: audience.to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            roles: Some(vec!["admin".to_string()]),
            extra: Map::new(),
        }
    }

    /// Create a builder matching the mock provider's issuer and client
    pub fn for_provider(idp: &MockIdentityProvider) -> Self {
        Self::new(&idp.issuer(), TEST_CLIENT_ID)
    }

    /// Set the issuer
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set a single audience
    pub fn audience(mut self, audience: &str) -> Self {
        self.aud = Value::String(audience.to_string());
        self
    }

    /// Set an audience array
    pub fn audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Replace the realm roles
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = Some(roles.iter().map(|r| r.to_string()).collect());
        self
    }

    /// Omit the `realm_access` claim entirely
    pub fn without_realm_access(mut self) -> Self {
        self.roles = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = json!({
            "iss": self.iss,
            "aud": self.aud,
            "sub": self.sub,
            "azp": self.azp,
            "exp": self.exp,
            "iat": self.iat,
            "typ": "Bearer",
        });

        if let Some(object) = claims.as_object_mut() {
            if let Some(roles) = self.roles {
                object.insert("realm_access".to_string(), json!({ "roles": roles }));
            }
            object.extend(self.extra);
        }

        claims
    }
}
