//! Ticket Service Library
//!
//! An HTTP API that issues tickets to authenticated callers. Every `/api`
//! route is guarded by bearer-token validation against a trusted OpenID
//! issuer:
//!
//! ```text
//! request -> AuthLayer -> JwtValidator -> JwksClient (cached KeySet)
//!                      -> handlers/*.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache, token validator, claims, clock
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication gate and HTTP metrics
//! - `models` - Data models
//! - `observability` - Prometheus metrics
//! - `repositories` - Ticket storage
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
