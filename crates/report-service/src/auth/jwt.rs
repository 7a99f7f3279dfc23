//! Token verification against the identity provider's signing keys.
//!
//! # Security
//!
//! - Tokens are size-checked before parsing
//! - Exactly one configured algorithm is accepted; a token whose header names
//!   any other algorithm is rejected before a key is looked up
//! - `exp`, `aud` and `iss` are required and validated
//! - Upstream failures are surfaced, never retried

use crate::auth::algorithm::SigningAlgorithm;
use crate::auth::claims::Claims;
use crate::auth::header::parse_unverified_header;
use crate::auth::jwks::{Jwk, KeyStore};
use crate::config::Config;
use crate::errors::ReportError;
use crate::observability::metrics::record_token_validation;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Expected values for the standard claims of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSettings {
    /// The only accepted signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Client identifier that must appear in `aud`.
    pub audience: String,

    /// Exact expected `iss`.
    pub issuer: String,

    /// Leeway applied to `exp`, in seconds.
    pub leeway_seconds: u64,
}

impl ValidationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            algorithm: config.algorithm,
            audience: config.client_id.clone(),
            issuer: config.issuer.clone(),
            leeway_seconds: config.clock_skew_seconds,
        }
    }
}

/// Verifies bearer tokens using keys from a [`KeyStore`].
pub struct TokenVerifier {
    key_store: Arc<KeyStore>,
    settings: ValidationSettings,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(key_store: Arc<KeyStore>, settings: ValidationSettings) -> Self {
        let mut validation = Validation::new(settings.algorithm.to_jsonwebtoken());
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.validate_exp = true;
        validation.leeway = settings.leeway_seconds;

        Self {
            key_store,
            settings,
            validation,
        }
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Verify a raw bearer token and return its claims.
    ///
    /// # Steps
    ///
    /// 1. Parse the unverified header; require `kid`
    /// 2. Reject a header `alg` other than the configured one
    /// 3. Look up `kid` in the key set (refetching on miss if enabled)
    /// 4. Verify the signature with the configured algorithm
    /// 5. Validate `exp`, `aud` and `iss`
    ///
    /// # Errors
    ///
    /// `MalformedToken`, `UnknownKey`, `SignatureInvalid`, `ClaimInvalid`, or
    /// `UpstreamUnavailable` propagated from the key store.
    #[instrument(skip_all, name = "report.auth.jwt.verify")]
    pub async fn verify(&self, token: &str) -> Result<Claims, ReportError> {
        let start = Instant::now();
        let result = self.verify_token(token).await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "report.auth.jwt", "Token validated successfully");
                record_token_validation("success", None, start.elapsed());
            }
            Err(e) => {
                tracing::debug!(target: "report.auth.jwt", kind = e.kind(), "Token validation failed");
                record_token_validation("error", Some(e.kind()), start.elapsed());
            }
        }

        result
    }

    async fn verify_token(&self, token: &str) -> Result<Claims, ReportError> {
        let header = parse_unverified_header(token)?;

        if header.alg != self.settings.algorithm.as_str() {
            tracing::warn!(
                target: "report.auth.jwt",
                token_alg = %header.alg,
                expected_alg = %self.settings.algorithm,
                "Token algorithm does not match configured algorithm"
            );
            return Err(ReportError::SignatureInvalid);
        }

        let jwk = self.select_key(&header.kid).await?;
        let decoding_key = decoding_key_for(&jwk, self.settings.algorithm)?;

        let token_data =
            decode::<serde_json::Map<String, serde_json::Value>>(token, &decoding_key, &self.validation)
                .map_err(|e| {
                    tracing::debug!(target: "report.auth.jwt", error = %e, "Token verification failed");
                    classify_decode_error(e.kind())
                })?;

        serde_json::from_value(serde_json::Value::Object(token_data.claims)).map_err(|e| {
            tracing::debug!(target: "report.auth.jwt", error = %e, "Verified claims have unexpected shape");
            ReportError::ClaimInvalid
        })
    }

    async fn select_key(&self, kid: &str) -> Result<Jwk, ReportError> {
        let keys = self.key_store.get_keys().await?;
        if let Some(jwk) = keys.find(kid) {
            return Ok(jwk.clone());
        }

        if let Some(refreshed) = self.key_store.refresh_after_miss(kid, &keys).await? {
            if let Some(jwk) = refreshed.find(kid) {
                return Ok(jwk.clone());
            }
        }

        tracing::warn!(target: "report.auth.jwt", kid = %kid, "No signing key matches token kid");
        Err(ReportError::UnknownKey)
    }
}

/// Build a decoding key, refusing keys that do not fit the pinned algorithm.
fn decoding_key_for(jwk: &Jwk, algorithm: SigningAlgorithm) -> Result<DecodingKey, ReportError> {
    if jwk.kty != algorithm.key_type() {
        tracing::warn!(target: "report.auth.jwt", kid = %jwk.kid, kty = %jwk.kty, "Unexpected JWK key type");
        return Err(ReportError::SignatureInvalid);
    }
    if let Some(alg) = &jwk.alg {
        if alg != algorithm.as_str() {
            tracing::warn!(target: "report.auth.jwt", kid = %jwk.kid, alg = %alg, "Unexpected JWK algorithm");
            return Err(ReportError::SignatureInvalid);
        }
    }
    if let Some(key_use) = &jwk.key_use {
        if key_use != "sig" {
            tracing::warn!(target: "report.auth.jwt", kid = %jwk.kid, key_use = %key_use, "JWK is not a signing key");
            return Err(ReportError::SignatureInvalid);
        }
    }

    let missing = |field: &str| {
        tracing::error!(target: "report.auth.jwt", kid = %jwk.kid, field = field, "JWK missing key material");
        ReportError::SignatureInvalid
    };

    let key = match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            DecodingKey::from_rsa_components(n, e)
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            DecodingKey::from_ec_components(x, y)
        }
        "OKP" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            DecodingKey::from_ed_components(x)
        }
        _ => return Err(ReportError::SignatureInvalid),
    };

    key.map_err(|e| {
        tracing::error!(target: "report.auth.jwt", kid = %jwk.kid, error = %e, "Invalid public key encoding");
        ReportError::SignatureInvalid
    })
}

fn classify_decode_error(kind: &ErrorKind) -> ReportError {
    match kind {
        ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => ReportError::ClaimInvalid,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            ReportError::MalformedToken
        }
        _ => ReportError::SignatureInvalid,
    }
}
