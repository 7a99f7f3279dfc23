//! Authentication and authorization for the report endpoint.
//!
//! Tokens are issued by an external identity provider and verified against the
//! realm's published JWKS.
//!
//! # Components
//!
//! - `jwks` - Key store fetching and caching the provider's signing keys
//! - `header` - Unverified header parsing for key selection
//! - `jwt` - Token verification (signature, `exp`, `aud`, `iss`)
//! - `claims` - Verified claims structure
//! - `policy` - Realm role check
//! - `gate` - Bearer extraction and the combined `AuthDecision`
//! - `algorithm` - The pinned signing algorithm

pub mod algorithm;
pub mod claims;
pub mod gate;
pub mod header;
pub mod jwks;
pub mod jwt;
pub mod policy;

pub use algorithm::SigningAlgorithm;
pub use claims::Claims;
pub use gate::{AuthDecision, ResourceGate};
pub use jwks::{JwksRefreshPolicy, KeyStore, SigningKeySet};
pub use jwt::{TokenVerifier, ValidationSettings};
pub use policy::{AccessPolicy, DenialReason, PolicyDecision};
