//! HTTP routes for the report service.
//!
//! Defines the Axum router and application state.

use crate::auth::{AccessPolicy, KeyStore, ResourceGate, TokenVerifier, ValidationSettings};
use crate::config::{Config, ConfigError};
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_report_access, AuthState};
use axum::{http::HeaderValue, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Authorization gate for protected routes.
    pub gate: Arc<ResourceGate>,
}

impl AppState {
    /// Wire the key store, verifier and access policy from configuration.
    ///
    /// No network traffic happens here; the key set is fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the JWKS client cannot be built
    /// with the configured fetch timeout.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let key_store = KeyStore::with_policy(
            config.jwks_url(),
            config.refresh_policy(),
            config.jwks_fetch_timeout,
        )
        .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let key_store = Arc::new(key_store);
        let verifier = Arc::new(TokenVerifier::new(
            key_store,
            ValidationSettings::from_config(&config),
        ));
        let policy = AccessPolicy::new(config.required_roles.clone());

        Ok(Self {
            gate: Arc::new(ResourceGate::new(verifier, policy)),
            config,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (key set available) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/reports` - Report download - requires an authorized bearer token
/// - CORS for the configured frontend origins
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        gate: state.gate.clone(),
    });
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/reports", get(handlers::get_report))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_report_access,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. CorsLayer - Answer preflights before routing and auth
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// Credentialed CORS for the given origins.
///
/// Credentials rule out wildcard methods and headers, so both are mirrored
/// from the preflight request instead.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
