//! Report service configuration.
//!
//! Configuration is loaded from environment variables once at process start.
//! There is no hot reload.

use crate::auth::{JwksRefreshPolicy, SigningAlgorithm};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default identity provider base URL.
pub const DEFAULT_KEYCLOAK_URL: &str = "http://localhost:8080";

/// Default realm name.
pub const DEFAULT_KEYCLOAK_REALM: &str = "master";

/// Default required role.
pub const DEFAULT_REQUIRED_ROLE: &str = "admin";

/// Default allowed CORS origin (local frontend dev server).
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default path of the backing report file.
pub const DEFAULT_REPORT_FILE_PATH: &str = "./report.pdf";

/// Default minimum spacing between refresh-on-miss fetches.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// Upper bound on `exp` leeway. Larger values would keep expired tokens usable.
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 600;

/// Report service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Identity provider base URL, without trailing slash.
    pub keycloak_url: String,

    /// Realm whose keys and roles are used.
    pub keycloak_realm: String,

    /// Expected `aud` claim (the client identifier).
    pub client_id: String,

    /// Expected `iss` claim.
    pub issuer: String,

    /// The only accepted signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Leeway applied to `exp` validation.
    pub clock_skew_seconds: u64,

    /// Roles a caller must all hold in `realm_access.roles`.
    pub required_roles: BTreeSet<String>,

    /// Key set TTL. `None` caches for the lifetime of the process.
    pub jwks_cache_ttl: Option<Duration>,

    /// Refetch the key set when a token names an unknown `kid`.
    pub jwks_refresh_on_miss: bool,

    /// Minimum spacing between refresh-on-miss fetches.
    pub jwks_min_refresh_interval: Duration,

    /// Upstream fetch timeout. `None` leaves the transport default (unbounded).
    pub jwks_fetch_timeout: Option<Duration>,

    /// Origins allowed to make credentialed cross-origin requests.
    pub cors_allowed_origins: Vec<String>,

    /// Path of the report served on success.
    pub report_file_path: PathBuf,

    /// Seconds to wait after a shutdown signal before exiting.
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid required roles configuration: {0}")]
    InvalidRequiredRoles(String),

    #[error("Invalid JWKS configuration: {0}")]
    InvalidJwks(String),

    #[error("Invalid CORS configuration: {0}")]
    InvalidCors(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to build JWKS HTTP client: {0}")]
    HttpClient(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let client_id = vars
            .get("KEYCLOAK_CLIENT_ID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("KEYCLOAK_CLIENT_ID".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let keycloak_url = vars
            .get("KEYCLOAK_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_KEYCLOAK_URL.to_string());

        let keycloak_realm = vars
            .get("KEYCLOAK_REALM")
            .cloned()
            .unwrap_or_else(|| DEFAULT_KEYCLOAK_REALM.to_string());

        let issuer = vars
            .get("JWT_ISSUER")
            .cloned()
            .unwrap_or_else(|| format!("{}/realms/{}", keycloak_url, keycloak_realm));

        let algorithm = match vars.get("JWT_ALGORITHM") {
            Some(value) => value
                .parse::<SigningAlgorithm>()
                .map_err(|e| ConfigError::InvalidAlgorithm(e.to_string()))?,
            None => SigningAlgorithm::default(),
        };

        let clock_skew_seconds = match vars.get("JWT_CLOCK_SKEW_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must be a non-negative integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value > MAX_CLOCK_SKEW_SECONDS {
                    return Err(ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                        MAX_CLOCK_SKEW_SECONDS, value
                    )));
                }

                value
            }
            None => 0,
        };

        let required_roles: BTreeSet<String> = match vars.get("REQUIRED_ROLES") {
            Some(value) => split_list(value).collect(),
            None => BTreeSet::from([DEFAULT_REQUIRED_ROLE.to_string()]),
        };
        if required_roles.is_empty() {
            return Err(ConfigError::InvalidRequiredRoles(
                "REQUIRED_ROLES must name at least one role".to_string(),
            ));
        }

        let jwks_cache_ttl = parse_optional_seconds(vars, "JWKS_CACHE_TTL_SECONDS")?;

        let jwks_refresh_on_miss = match vars.get("JWKS_REFRESH_ON_MISS") {
            Some(value) => parse_bool(value).ok_or_else(|| {
                ConfigError::InvalidJwks(format!(
                    "JWKS_REFRESH_ON_MISS must be true or false, got '{}'",
                    value
                ))
            })?,
            None => false,
        };

        let jwks_min_refresh_interval =
            parse_optional_seconds(vars, "JWKS_MIN_REFRESH_INTERVAL_SECONDS")?.unwrap_or(
                Duration::from_secs(DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS),
            );

        let jwks_fetch_timeout = parse_optional_seconds(vars, "JWKS_FETCH_TIMEOUT_SECONDS")?;

        let cors_allowed_origins: Vec<String> = match vars.get("CORS_ALLOWED_ORIGINS") {
            Some(value) => split_list(value).collect(),
            None => vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
        };
        if let Some(origin) = cors_allowed_origins
            .iter()
            .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
        {
            return Err(ConfigError::InvalidCors(format!(
                "CORS origin must be an http(s) origin, got '{}'",
                origin
            )));
        }

        let report_file_path = vars
            .get("REPORT_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_FILE_PATH));

        let drain_seconds = match vars.get("REPORT_DRAIN_SECONDS") {
            Some(value) => value.parse().map_err(|e| {
                ConfigError::InvalidValue(
                    "REPORT_DRAIN_SECONDS".to_string(),
                    format!("expected a non-negative integer, got '{}': {}", value, e),
                )
            })?,
            None => 0,
        };

        Ok(Config {
            bind_address,
            keycloak_url,
            keycloak_realm,
            client_id,
            issuer,
            algorithm,
            clock_skew_seconds,
            required_roles,
            jwks_cache_ttl,
            jwks_refresh_on_miss,
            jwks_min_refresh_interval,
            jwks_fetch_timeout,
            cors_allowed_origins,
            report_file_path,
            drain_seconds,
        })
    }

    /// URL of the realm's published signing keys.
    pub fn jwks_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/certs",
            self.keycloak_url, self.keycloak_realm
        )
    }

    /// Key set refresh policy derived from the JWKS settings.
    pub fn refresh_policy(&self) -> JwksRefreshPolicy {
        JwksRefreshPolicy {
            ttl: self.jwks_cache_ttl,
            refresh_on_miss: self.jwks_refresh_on_miss,
            min_refresh_interval: self.jwks_min_refresh_interval,
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parse an optional strictly positive number of seconds.
fn parse_optional_seconds(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(None);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidJwks(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidJwks(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(Some(Duration::from_secs(value)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "KEYCLOAK_CLIENT_ID".to_string(),
            "report-frontend".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.keycloak_url, DEFAULT_KEYCLOAK_URL);
        assert_eq!(config.keycloak_realm, DEFAULT_KEYCLOAK_REALM);
        assert_eq!(config.client_id, "report-frontend");
        assert_eq!(config.issuer, "http://localhost:8080/realms/master");
        assert_eq!(config.algorithm, SigningAlgorithm::RS256);
        assert_eq!(config.clock_skew_seconds, 0);
        assert_eq!(
            config.required_roles,
            BTreeSet::from(["admin".to_string()])
        );
        assert!(config.jwks_cache_ttl.is_none());
        assert!(!config.jwks_refresh_on_miss);
        assert_eq!(config.jwks_min_refresh_interval, Duration::from_secs(30));
        assert!(config.jwks_fetch_timeout.is_none());
        assert_eq!(config.cors_allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.report_file_path, PathBuf::from("./report.pdf"));
        assert_eq!(config.drain_seconds, 0);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert(
            "KEYCLOAK_URL".to_string(),
            "https://id.example.com/".to_string(),
        );
        vars.insert("KEYCLOAK_REALM".to_string(), "reports".to_string());
        vars.insert("JWT_ALGORITHM".to_string(), "ES256".to_string());
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "30".to_string());
        vars.insert(
            "REQUIRED_ROLES".to_string(),
            "report-reader, auditor".to_string(),
        );
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "300".to_string());
        vars.insert("JWKS_REFRESH_ON_MISS".to_string(), "true".to_string());
        vars.insert(
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS".to_string(),
            "5".to_string(),
        );
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "10".to_string());
        vars.insert(
            "CORS_ALLOWED_ORIGINS".to_string(),
            "https://app.example.com,https://admin.example.com".to_string(),
        );
        vars.insert(
            "REPORT_FILE_PATH".to_string(),
            "/srv/reports/q3.pdf".to_string(),
        );
        vars.insert("REPORT_DRAIN_SECONDS".to_string(), "15".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.keycloak_url, "https://id.example.com");
        assert_eq!(config.issuer, "https://id.example.com/realms/reports");
        assert_eq!(config.algorithm, SigningAlgorithm::ES256);
        assert_eq!(config.clock_skew_seconds, 30);
        assert_eq!(
            config.required_roles,
            BTreeSet::from(["auditor".to_string(), "report-reader".to_string()])
        );
        assert_eq!(config.jwks_cache_ttl, Some(Duration::from_secs(300)));
        assert!(config.jwks_refresh_on_miss);
        assert_eq!(config.jwks_min_refresh_interval, Duration::from_secs(5));
        assert_eq!(config.jwks_fetch_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.cors_allowed_origins.len(), 2);
        assert_eq!(config.report_file_path, PathBuf::from("/srv/reports/q3.pdf"));
        assert_eq!(config.drain_seconds, 15);
    }

    #[test]
    fn test_explicit_issuer_overrides_derived() {
        let mut vars = base_vars();
        vars.insert(
            "JWT_ISSUER".to_string(),
            "https://public.example.com/realms/master".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.issuer, "https://public.example.com/realms/master");
    }

    #[test]
    fn test_jwks_url() {
        let mut vars = base_vars();
        vars.insert("KEYCLOAK_URL".to_string(), "https://id.example.com".to_string());
        vars.insert("KEYCLOAK_REALM".to_string(), "reports".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(
            config.jwks_url(),
            "https://id.example.com/realms/reports/protocol/openid-connect/certs"
        );
    }

    #[test]
    fn test_refresh_policy_from_config() {
        let mut vars = base_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "60".to_string());

        let policy = Config::from_vars(&vars).unwrap().refresh_policy();
        assert_eq!(policy.ttl, Some(Duration::from_secs(60)));
        assert!(!policy.refresh_on_miss);
    }

    #[test]
    fn test_from_vars_missing_client_id() {
        let result = Config::from_vars(&HashMap::new());
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "KEYCLOAK_CLIENT_ID")
        );
    }

    #[test]
    fn test_empty_client_id_is_missing() {
        let vars = HashMap::from([("KEYCLOAK_CLIENT_ID".to_string(), String::new())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_symmetric_algorithm_rejected() {
        let mut vars = base_vars();
        vars.insert("JWT_ALGORITHM".to_string(), "HS256".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidAlgorithm(msg)) if msg.contains("HS256"))
        );
    }

    #[test]
    fn test_clock_skew_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_clock_skew_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "-5".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwtClockSkew(_))
        ));
    }

    #[test]
    fn test_required_roles_rejects_empty_list() {
        let mut vars = base_vars();
        vars.insert("REQUIRED_ROLES".to_string(), " , ,".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidRequiredRoles(_))
        ));
    }

    #[test]
    fn test_jwks_ttl_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwks(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_jwks_timeout_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "ten".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwks(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_refresh_on_miss_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert("JWKS_REFRESH_ON_MISS".to_string(), "sometimes".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwks(_))
        ));
    }

    #[test]
    fn test_cors_rejects_non_http_origin() {
        let mut vars = base_vars();
        vars.insert("CORS_ALLOWED_ORIGINS".to_string(), "*".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidCors(_))
        ));
    }
}
