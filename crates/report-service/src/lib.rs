//! Report Service Library
//!
//! Serves a protected PDF report to callers holding a valid bearer token
//! issued by a Keycloak realm.
//!
//! # Modules
//!
//! - `auth` - Key store, token verification, access policy, resource gate
//! - `config` - Environment configuration
//! - `errors` - Error types and HTTP mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authorization and metrics middleware
//! - `models` - Response bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Router and application state

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
