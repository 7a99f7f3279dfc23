//! Pinned token signing algorithm.
//!
//! Only asymmetric algorithms are representable, so a deployment can never be
//! configured to accept HMAC tokens keyed with a published public key.

use jsonwebtoken::Algorithm;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The single signing algorithm a deployment accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningAlgorithm {
    #[default]
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    EdDSA,
}

impl SigningAlgorithm {
    /// The `alg` header value for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
            SigningAlgorithm::ES256 => "ES256",
            SigningAlgorithm::ES384 => "ES384",
            SigningAlgorithm::EdDSA => "EdDSA",
        }
    }

    /// JWK `kty` a key must have to verify this algorithm.
    pub fn key_type(&self) -> &'static str {
        match self {
            SigningAlgorithm::RS256
            | SigningAlgorithm::RS384
            | SigningAlgorithm::RS512
            | SigningAlgorithm::PS256
            | SigningAlgorithm::PS384
            | SigningAlgorithm::PS512 => "RSA",
            SigningAlgorithm::ES256 | SigningAlgorithm::ES384 => "EC",
            SigningAlgorithm::EdDSA => "OKP",
        }
    }

    pub fn to_jsonwebtoken(self) -> Algorithm {
        match self {
            SigningAlgorithm::RS256 => Algorithm::RS256,
            SigningAlgorithm::RS384 => Algorithm::RS384,
            SigningAlgorithm::RS512 => Algorithm::RS512,
            SigningAlgorithm::PS256 => Algorithm::PS256,
            SigningAlgorithm::PS384 => Algorithm::PS384,
            SigningAlgorithm::PS512 => Algorithm::PS512,
            SigningAlgorithm::ES256 => Algorithm::ES256,
            SigningAlgorithm::ES384 => Algorithm::ES384,
            SigningAlgorithm::EdDSA => Algorithm::EdDSA,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an algorithm name is unknown or symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported signing algorithm '{0}'")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for SigningAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(SigningAlgorithm::RS256),
            "RS384" => Ok(SigningAlgorithm::RS384),
            "RS512" => Ok(SigningAlgorithm::RS512),
            "PS256" => Ok(SigningAlgorithm::PS256),
            "PS384" => Ok(SigningAlgorithm::PS384),
            "PS512" => Ok(SigningAlgorithm::PS512),
            "ES256" => Ok(SigningAlgorithm::ES256),
            "ES384" => Ok(SigningAlgorithm::ES384),
            "EdDSA" => Ok(SigningAlgorithm::EdDSA),
            other => Err(UnsupportedAlgorithm(other.to_string())),
        }
    }
}
