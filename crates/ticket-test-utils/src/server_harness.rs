//! Test server harness for E2E testing
//!
//! Provides `TestTicketServer` for spawning real ticket service instances
//! in tests, backed by [`MemoryTicketStore`] and a [`MockIssuer`].

use crate::memory_store::MemoryTicketStore;
use crate::mock_issuer::MockIssuer;
use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER, TEST_NOW};
use chrono::{TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use ticket_service::auth::{JwksClient, JwtValidator, ManualClock, ScopeFormatValidator};
use ticket_service::config::Config;
use ticket_service::routes::{self, AppState};
use tokio::task::JoinHandle;

/// Public ticket URL prefix the harness configures.
pub const TEST_CLIENT_URL: &str = "https://tickets.example";

/// Scope the harness requires for issuing tickets.
pub const TEST_WRITE_SCOPE: &str = "tickets:write";

/// Test harness for spawning the ticket service in E2E tests.
///
/// The service's clock is a [`ManualClock`] starting at [`TEST_NOW`], so
/// tokens from `TestTokenBuilder` are valid and cache expiry is driven by
/// the test.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let issuer = MockIssuer::start().await;
///     let server = TestTicketServer::spawn(&issuer).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestTicketServer {
    addr: SocketAddr,
    store: Arc<MemoryTicketStore>,
    clock: Arc<ManualClock>,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestTicketServer {
    /// Spawn a server trusting `issuer`, with an empty store.
    pub async fn spawn(issuer: &MockIssuer) -> Result<Self, anyhow::Error> {
        Self::spawn_with(issuer, Arc::new(MemoryTicketStore::new()), &[]).await
    }

    /// Spawn a server with a given store and extra environment variables.
    ///
    /// `overrides` are applied on top of the harness defaults, so any
    /// configuration variable can be changed per test.
    pub async fn spawn_with(
        issuer: &MockIssuer,
        store: Arc<MemoryTicketStore>,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("CLIENT_URL".to_string(), TEST_CLIENT_URL.to_string()),
            ("AUTH_ISSUER_URL".to_string(), TEST_ISSUER.to_string()),
            ("AUTH0_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("JWKS_URL".to_string(), issuer.jwks_url()),
            (
                "TICKETS_WRITE_SCOPE".to_string(),
                TEST_WRITE_SCOPE.to_string(),
            ),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let start = Utc
            .timestamp_opt(TEST_NOW, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("Invalid test start time"))?;
        let clock = Arc::new(ManualClock::new(start));

        let jwks_client = JwksClient::new(config.jwks_config(), clock.clone());
        let jwt_validator = Arc::new(
            JwtValidator::new(jwks_client, config.validator_config(), clock.clone())
                .with_claims_validator(ScopeFormatValidator),
        );

        let state = Arc::new(AppState {
            store: store.clone(),
            config: config.clone(),
            jwt_validator,
        });

        // Not installed globally; tests run many servers in one process
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            clock,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The store behind the server.
    pub fn store(&self) -> &Arc<MemoryTicketStore> {
        &self.store
    }

    /// The server's clock.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestTicketServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
