//! Router assembly.
//!
//! Probes and the metrics scrape are public. Everything under `/api` is
//! wrapped in [`AuthLayer`] with `route_layer`, so unmatched paths get a
//! plain 404 instead of a 401.

use crate::auth::JwtValidator;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, AuthLayer};
use crate::repositories::TicketStore;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Upper bound on handling one request, authentication included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the ticket and probe handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub config: Config,

    /// Also used by the readiness probe to check signing keys.
    pub jwt_validator: Arc<JwtValidator>,
}

/// Build the full application router.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let probes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(Arc::clone(&state));

    let scrape = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Last layer added runs first: metrics see timeouts, traces see handlers
    probes
        .merge(scrape)
        .merge(api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// The ticket API, behind the authentication gate.
fn api_routes(state: Arc<AppState>) -> Router {
    let gate = AuthLayer::new(Arc::clone(&state.jwt_validator))
        .with_timeout(state.config.auth_timeout);

    Router::new()
        .route("/api/tickets/total", get(handlers::get_total_tickets))
        .route("/api/tickets/:id", get(handlers::get_ticket))
        .route("/api/generate", post(handlers::generate_ticket))
        .route_layer(gate)
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{JwksClient, JwksConfig, ManualClock, ValidatorConfig};
    use crate::errors::TicketError;
    use crate::models::Ticket;
    use crate::repositories::{CreateTicketOutcome, TicketFilter};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct EmptyStore;

    #[async_trait::async_trait]
    impl TicketStore for EmptyStore {
        async fn create_ticket(
            &self,
            ticket: Ticket,
            _max_per_vatin: u32,
        ) -> Result<CreateTicketOutcome, TicketError> {
            Ok(CreateTicketOutcome::Created(ticket))
        }

        async fn count_tickets(&self, _filter: &TicketFilter) -> Result<i64, TicketError> {
            Ok(0)
        }

        async fn get_ticket(&self, _id: Uuid) -> Result<Option<Ticket>, TicketError> {
            Ok(None)
        }

        async fn ping(&self) -> Result<(), TicketError> {
            Ok(())
        }
    }

    fn app() -> Router {
        let vars = HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://test/test".to_string()),
            ("AUTH_ISSUER_URL".to_string(), "https://issuer.example/".to_string()),
            ("AUTH0_AUDIENCE".to_string(), "api".to_string()),
            ("JWKS_URL".to_string(), "http://127.0.0.1:9/jwks.json".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let validator = JwtValidator::new(
            JwksClient::new(JwksConfig::new(config.jwks_url.clone()), clock.clone()),
            ValidatorConfig::new("https://issuer.example/", "api"),
            clock,
        );
        let state = Arc::new(AppState {
            store: Arc::new(EmptyStore),
            config,
            jwt_validator: Arc::new(validator),
        });
        build_routes(state, PrometheusBuilder::new().build_recorder().handle())
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_api_routes_require_token() {
        for (method, uri) in [
            ("GET", "/api/tickets/total"),
            ("GET", "/api/tickets/00000000-0000-0000-0000-000000000000"),
            ("POST", "/api/generate"),
        ] {
            assert_eq!(status_of(method, uri).await, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_probes_are_public() {
        assert_eq!(status_of("GET", "/health").await, StatusCode::OK);
        assert_eq!(status_of("GET", "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let request = Request::builder()
            .uri("/api/unknown")
            .header(header::AUTHORIZATION, "Bearer x.y.z")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
