//! HTTP request handlers for the ticket service.

pub mod health;
pub mod metrics;
pub mod tickets;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use tickets::{generate_ticket, get_ticket, get_total_tickets};
