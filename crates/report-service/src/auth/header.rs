//! Unverified JWT header parsing.
//!
//! The header is read before any signature check, only to select a key and to
//! pin the algorithm. Nothing in it is trusted for authorization.

use crate::errors::ReportError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// Maximum accepted token size in bytes (8KB).
///
/// Checked before base64 decoding or any cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Fields read from a token header without verifying the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Key identifier used to select a signing key.
    pub kid: String,

    /// Algorithm the token claims to be signed with.
    pub alg: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<serde_json::Value>,
}

/// Extract `kid` and `alg` from a compact JWS without verifying it.
///
/// # Errors
///
/// Returns `ReportError::MalformedToken` if the token is oversized, does not
/// have three segments, the header is not base64url-encoded JSON, or the
/// header lacks a non-empty string `kid` or a string `alg`.
pub fn parse_unverified_header(token: &str) -> Result<UnverifiedHeader, ReportError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "report.auth.header",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(ReportError::MalformedToken);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "report.auth.header", "Token rejected: invalid JWT format");
        return Err(ReportError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "report.auth.header", error = %e, "Failed to decode JWT header base64");
        ReportError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "report.auth.header", error = %e, "Failed to parse JWT header JSON");
        ReportError::MalformedToken
    })?;

    let kid = header
        .kid
        .as_ref()
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "report.auth.header", "Token header has no usable kid");
            ReportError::MalformedToken
        })?;

    let alg = header
        .alg
        .as_ref()
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "report.auth.header", "Token header has no alg");
            ReportError::MalformedToken
        })?;

    Ok(UnverifiedHeader { kid, alg })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        format!("{}.payload.signature", URL_SAFE_NO_PAD.encode(header.as_bytes()))
    }

    #[test]
    fn test_valid_header() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);

        let header = parse_unverified_header(&token).unwrap();
        assert_eq!(header.kid, "key-01");
        assert_eq!(header.alg, "RS256");
    }

    #[test]
    fn test_missing_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);
        assert_eq!(
            parse_unverified_header(&token),
            Err(ReportError::MalformedToken)
        );
    }

    #[test]
    fn test_non_string_or_empty_kid() {
        for header in [
            r#"{"alg":"RS256","kid":12345}"#,
            r#"{"alg":"RS256","kid":null}"#,
            r#"{"alg":"RS256","kid":""}"#,
        ] {
            assert_eq!(
                parse_unverified_header(&token_with_header(header)),
                Err(ReportError::MalformedToken),
                "header {} should be rejected",
                header
            );
        }
    }

    #[test]
    fn test_missing_alg() {
        let token = token_with_header(r#"{"kid":"key-01"}"#);
        assert_eq!(
            parse_unverified_header(&token),
            Err(ReportError::MalformedToken)
        );
    }

    #[test]
    fn test_wrong_segment_count() {
        for token in ["not.a.valid.jwt.format", "only.two", "single", ""] {
            assert_eq!(
                parse_unverified_header(token),
                Err(ReportError::MalformedToken)
            );
        }
    }

    #[test]
    fn test_invalid_base64_and_json() {
        assert_eq!(
            parse_unverified_header("!!!invalid!!!.payload.signature"),
            Err(ReportError::MalformedToken)
        );
        assert_eq!(
            parse_unverified_header(&token_with_header("not valid json")),
            Err(ReportError::MalformedToken)
        );
    }

    #[test]
    fn test_oversized_token_rejected_before_parsing() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key-01"}"#);
        let token = format!("{}.{}.sig", header, "a".repeat(MAX_JWT_SIZE_BYTES));

        assert_eq!(
            parse_unverified_header(&token),
            Err(ReportError::MalformedToken)
        );
    }
}
