//! Liveness and readiness probes.
//!
//! `/health` answers as long as the process runs. `/ready` additionally
//! requires the ticket store to answer and a usable KeySet, since without
//! one every protected request would be rejected.

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

/// Liveness probe. Does not check dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe.
///
/// A cached KeySet younger than the TTL counts as available; otherwise one
/// refresh is attempted. Causes are logged, the body stays generic.
#[tracing::instrument(skip_all, name = "ticket.health.readiness")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(target: "ticket.health", error = %e, "Ticket store unreachable");
        return not_ready(ReadinessResponse::not_ready("unhealthy", None));
    }

    let jwks = state.jwt_validator.jwks();
    if jwks.has_fresh_keys().await {
        return (StatusCode::OK, Json(ReadinessResponse::ready()));
    }

    match jwks.force_refresh().await {
        Ok(()) => (StatusCode::OK, Json(ReadinessResponse::ready())),
        Err(e) => {
            tracing::warn!(target: "ticket.health", error = %e, "Signing keys unavailable");
            not_ready(ReadinessResponse::not_ready("healthy", Some("unavailable")))
        }
    }
}

fn not_ready(body: ReadinessResponse) -> (StatusCode, Json<ReadinessResponse>) {
    (StatusCode::SERVICE_UNAVAILABLE, Json(body))
}
