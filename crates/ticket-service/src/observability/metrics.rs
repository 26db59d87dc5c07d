//! Metrics definitions for the ticket service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ticket_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `status`: success, error, timeout
//! - `error_type`: bounded by `AuthError` variants
//! - `operation`: bounded by code (create_ticket, count_tickets, ...)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// Can only succeed once per process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("ticket_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("ticket_token_validation".to_string()),
            &[0.0005, 0.001, 0.002, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000],
        )
        .map_err(|e| format!("Failed to set token validation buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("ticket_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("ticket_db_query".to_string()),
            &[0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `ticket_http_requests_total`, `ticket_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("ticket_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("ticket_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/generate" => "/api/generate",
        "/api/tickets/total" => "/api/tickets/total",
        p if p
            .strip_prefix("/api/tickets/")
            .is_some_and(|id| !id.is_empty() && !id.contains('/')) =>
        {
            "/api/tickets/{id}"
        }
        _ => "/other",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the outcome of one token validation.
///
/// Metric: `ticket_token_validations_total`, `ticket_token_validation_duration_seconds`
/// Labels: `status`, `error_type` (`none` on success)
pub fn record_token_validation(status: &'static str, error_type: &'static str, duration: Duration) {
    histogram!("ticket_token_validation_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("ticket_token_validations_total",
        "status" => status,
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a key-discovery refresh.
///
/// Metric: `ticket_jwks_refresh_total`, `ticket_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("ticket_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("ticket_jwks_refresh_total", "status" => status).increment(1);
}

/// Set the number of keys in the current KeySet.
///
/// Metric: `ticket_jwks_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_jwks_keys(count: usize) {
    gauge!("ticket_jwks_keys").set(count as f64);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record a ticket store query.
///
/// Metric: `ticket_db_queries_total`, `ticket_db_query_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("ticket_db_query_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("ticket_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record an issued ticket or a per-VATIN limit rejection.
///
/// Metric: `ticket_issued_total`
/// Labels: `outcome` (created, limit_reached)
pub fn record_ticket_issued(outcome: &'static str) {
    counter!("ticket_issued_total", "outcome" => outcome).increment(1);
}
