//! HTTP request handlers for the report service.

pub mod health;
pub mod metrics;
pub mod reports;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use reports::get_report;
