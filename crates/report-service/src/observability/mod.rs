//! Observability for the report service.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
