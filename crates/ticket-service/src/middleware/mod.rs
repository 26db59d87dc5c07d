//! Middleware for the ticket service.

pub mod auth;
pub mod http_metrics;

pub use auth::{AuthLayer, AuthService, AuthenticatedClaims, ClaimsExt};
pub use http_metrics::http_metrics_middleware;
