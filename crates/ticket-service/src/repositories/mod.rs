//! Ticket storage.
//!
//! Handlers talk to [`TicketStore`]; [`PgTicketStore`] is the production
//! implementation. Tests substitute an in-memory store.

pub mod tickets;

pub use tickets::PgTicketStore;

use crate::errors::TicketError;
use crate::models::Ticket;
use uuid::Uuid;

/// Which tickets to count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    /// Only tickets issued to this VATIN.
    pub vatin: Option<String>,
}

impl TicketFilter {
    /// Every ticket.
    pub fn all() -> Self {
        Self::default()
    }

    /// Tickets issued to one VATIN.
    pub fn by_vatin(vatin: impl Into<String>) -> Self {
        Self {
            vatin: Some(vatin.into()),
        }
    }
}

/// Result of an attempt to issue a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTicketOutcome {
    Created(Ticket),

    /// The VATIN already holds the maximum number of tickets.
    LimitReached,
}

/// Storage operations the ticket API needs.
#[async_trait::async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert `ticket` unless its VATIN already holds `max_per_vatin`
    /// tickets. The check and the insert are atomic per VATIN.
    async fn create_ticket(
        &self,
        ticket: Ticket,
        max_per_vatin: u32,
    ) -> Result<CreateTicketOutcome, TicketError>;

    /// Count tickets matching `filter`.
    async fn count_tickets(&self, filter: &TicketFilter) -> Result<i64, TicketError>;

    /// Look up a ticket by id.
    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), TicketError>;
}
