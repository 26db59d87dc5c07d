//! Ticket Service
//!
//! Issues identity-bound tickets over HTTP. Every `/api` route requires a
//! bearer token from the configured issuer.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use ticket_service::auth::{JwksClient, JwtValidator, ScopeFormatValidator, SystemClock};
use ticket_service::config::Config;
use ticket_service::observability::metrics::init_metrics_recorder;
use ticket_service::repositories::PgTicketStore;
use ticket_service::routes::{self, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Seconds to keep serving in-flight requests after a shutdown signal.
const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Postgres `statement_timeout` applied to every connection.
const STATEMENT_TIMEOUT_SECONDS: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Invalid configuration, refusing to start: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.issuer_url,
        audience = %config.audience,
        jwks_url = %config.jwks_url,
        max_tickets_per_vatin = config.max_tickets_per_vatin,
        "Starting Ticket Service"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let pool = connect_database(&config).await?;
    let jwt_validator = build_validator(&config).await;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address {}: {}", config.bind_address, e);
        e
    })?;

    let state = Arc::new(AppState {
        store: Arc::new(PgTicketStore::new(pool)),
        config,
        jwt_validator,
    });
    let app = routes::build_routes(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Ticket Service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Ticket Service stopped");
    Ok(())
}

/// Open the connection pool and bring the schema up to date.
async fn connect_database(config: &Config) -> Result<PgPool, Box<dyn std::error::Error>> {
    let url = with_statement_timeout(&config.database_url, STATEMENT_TIMEOUT_SECONDS);
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            error!("Failed to run database migrations: {}", e);
            e
        })?;

    info!("Database ready");
    Ok(pool)
}

/// Build the token validator and warm its key cache.
///
/// A failed warm-up is not fatal; the first request fetches the keys.
async fn build_validator(config: &Config) -> Arc<JwtValidator> {
    let clock = Arc::new(SystemClock);
    let jwks = JwksClient::new(config.jwks_config(), clock.clone());

    match jwks.force_refresh().await {
        Ok(()) => info!(key_count = jwks.key_count().await, "Signing keys loaded"),
        Err(e) => warn!(error = %e, "Initial JWKS fetch failed, keys will be fetched on demand"),
    }

    Arc::new(
        JwtValidator::new(jwks, config.validator_config(), clock)
            .with_claims_validator(ScopeFormatValidator),
    )
}

/// Resolves on SIGINT or SIGTERM, after the drain period.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain = std::env::var("TICKET_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DRAIN_SECONDS);

    info!(drain_seconds = drain, "Shutdown signal received");
    if drain > 0 {
        tokio::time::sleep(Duration::from_secs(drain)).await;
    }
}

/// Append a `statement_timeout` connection option to a Postgres URL.
fn with_statement_timeout(url: &str, seconds: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}options=-c%20statement_timeout%3D{seconds}s")
}
