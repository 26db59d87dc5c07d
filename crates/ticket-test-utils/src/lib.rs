//! # Ticket Test Utilities
//!
//! Shared test utilities for the ticket service.
//!
//! This crate provides:
//! - Deterministic signing keys (`crypto_fixtures`)
//! - Signed token construction (`token_builders`)
//! - A mock identity provider serving a key-discovery document (`mock_issuer`)
//! - An in-memory ticket store (`memory_store`)
//! - Server test harness (`TestTicketServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ticket_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let issuer = MockIssuer::start().await;
//!     let key = TestRsaKey::primary();
//!     issuer.publish(vec![key.jwk()]).await;
//!
//!     let server = TestTicketServer::spawn(&issuer).await?;
//!     let token = TestTokenBuilder::new().with_scope("tickets:write").sign(&key);
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/tickets/total", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod memory_store;
pub mod mock_issuer;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use memory_store::*;
pub use mock_issuer::*;
pub use server_harness::*;
pub use token_builders::*;
