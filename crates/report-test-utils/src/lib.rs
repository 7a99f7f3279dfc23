//! # Report Test Utilities
//!
//! Shared test utilities for the report service.
//!
//! This crate provides:
//! - Fixed RSA signing keys and their JWK form
//! - A claims builder shaped like a Keycloak access token
//! - A mock identity provider serving the realm JWKS (wiremock)
//! - Server test harness (`TestReportServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use report_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let idp = MockIdentityProvider::start().await;
//!     let key = primary_signing_key();
//!     idp.serve_keys(&[&key]).await;
//!
//!     let server = TestReportServer::spawn(&idp).await?;
//!     let token = key.sign(&TestClaimsBuilder::for_provider(&idp).build())?;
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/reports", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
