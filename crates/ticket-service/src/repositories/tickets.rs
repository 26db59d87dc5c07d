//! PostgreSQL ticket store.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - The per-VATIN limit is checked and applied under a transaction-scoped
//!   advisory lock, so concurrent requests cannot overshoot it

use crate::errors::TicketError;
use crate::models::Ticket;
use crate::observability::metrics;
use crate::repositories::{CreateTicketOutcome, TicketFilter, TicketStore};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Ticket store backed by the `tickets` table.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(operation: &'static str, start: Instant) -> impl FnOnce(sqlx::Error) -> TicketError {
    move |e| {
        metrics::record_db_query(operation, "error", start.elapsed());
        TicketError::Database(e.to_string())
    }
}

#[async_trait::async_trait]
impl TicketStore for PgTicketStore {
    #[instrument(skip_all, name = "ticket.repo.create_ticket")]
    async fn create_ticket(
        &self,
        ticket: Ticket,
        max_per_vatin: u32,
    ) -> Result<CreateTicketOutcome, TicketError> {
        let start = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("create_ticket", start))?;

        // Serializes issuing per VATIN until the transaction ends
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&ticket.vatin)
            .execute(&mut *tx)
            .await
            .map_err(db_error("create_ticket", start))?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE vatin = $1")
            .bind(&ticket.vatin)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("create_ticket", start))?;

        if existing >= i64::from(max_per_vatin) {
            tx.rollback()
                .await
                .map_err(db_error("create_ticket", start))?;
            metrics::record_db_query("create_ticket", "success", start.elapsed());
            return Ok(CreateTicketOutcome::LimitReached);
        }

        sqlx::query(
            r#"
            INSERT INTO tickets (id, vatin, first_name, last_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ticket.id) // $1
        .bind(&ticket.vatin) // $2
        .bind(&ticket.first_name) // $3
        .bind(&ticket.last_name) // $4
        .bind(ticket.created_at) // $5
        .execute(&mut *tx)
        .await
        .map_err(db_error("create_ticket", start))?;

        tx.commit().await.map_err(db_error("create_ticket", start))?;

        metrics::record_db_query("create_ticket", "success", start.elapsed());
        Ok(CreateTicketOutcome::Created(ticket))
    }

    #[instrument(skip_all, name = "ticket.repo.count_tickets")]
    async fn count_tickets(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let start = Instant::now();

        let count: i64 = match &filter.vatin {
            Some(vatin) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE vatin = $1")
                    .bind(vatin)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tickets")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(db_error("count_tickets", start))?;

        metrics::record_db_query("count_tickets", "success", start.elapsed());
        Ok(count)
    }

    #[instrument(skip_all, name = "ticket.repo.get_ticket")]
    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError> {
        let start = Instant::now();

        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT id, vatin, first_name, last_name, created_at FROM tickets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get_ticket", start))?;

        metrics::record_db_query("get_ticket", "success", start.elapsed());
        Ok(ticket)
    }

    async fn ping(&self) -> Result<(), TicketError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| TicketError::Database(e.to_string()))
    }
}
