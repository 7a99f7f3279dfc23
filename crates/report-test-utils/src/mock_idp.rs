//! Mock identity provider
//!
//! A wiremock server answering the realm's JWKS endpoint the way Keycloak
//! does, so key fetches can be counted and rotated in tests.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Realm name used by the mock provider.
pub const TEST_REALM: &str = "test";

/// Client identifier expected as the token audience.
pub const TEST_CLIENT_ID: &str = "report-frontend";

/// Mock Keycloak exposing `/realms/{realm}/protocol/openid-connect/certs`.
///
/// Expectations set with [`MockIdentityProvider::expect_fetches`] are
/// verified when the provider is dropped.
pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    /// Start a mock provider on a random local port with no keys mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL, the equivalent of `KEYCLOAK_URL`.
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Issuer of tokens from the test realm.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server.uri(), TEST_REALM)
    }

    /// Path of the realm JWKS endpoint.
    pub fn jwks_path() -> String {
        format!("/realms/{}/protocol/openid-connect/certs", TEST_REALM)
    }

    /// Full URL of the realm JWKS endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), Self::jwks_path())
    }

    /// Publish the given keys with no expectation on fetch count.
    pub async fn serve_keys(&self, keys: &[&TestSigningKey]) {
        self.keys_mock(keys).mount(&self.server).await;
    }

    /// Publish the given keys and require exactly `times` fetches.
    pub async fn expect_fetches(&self, keys: &[&TestSigningKey], times: u64) {
        self.keys_mock(keys).expect(times).mount(&self.server).await;
    }

    /// Publish the given keys, answering only after `delay`.
    pub async fn serve_keys_after(&self, keys: &[&TestSigningKey], delay: Duration) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_document(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer the JWKS endpoint with the given status and an empty body.
    pub async fn fail_with_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer the JWKS endpoint with a body that is not a key set.
    pub async fn serve_garbage(&self) {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&self.server)
            .await;
    }

    /// Drop all mounted responses, e.g. before publishing a rotated set.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of JWKS requests received so far.
    pub async fn fetch_count(&self) -> usize {
        let jwks_path = Self::jwks_path();
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == jwks_path)
                    .count()
            })
            .unwrap_or(0)
    }

    fn keys_mock(&self, keys: &[&TestSigningKey]) -> Mock {
        Mock::given(method("GET"))
            .and(path(Self::jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
    }
}
