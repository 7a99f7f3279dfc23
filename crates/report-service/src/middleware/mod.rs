//! HTTP middleware for the report service.
//!
//! # Components
//!
//! - `auth` - Bearer token authorization for the report route
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_report_access, AuthState, ClaimsExt};
pub use http_metrics::http_metrics_middleware;
