//! Observability for the ticket service: Prometheus metrics.

pub mod metrics;
