//! In-memory ticket store for handler and E2E tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use ticket_service::errors::TicketError;
use ticket_service::models::Ticket;
use ticket_service::repositories::{CreateTicketOutcome, TicketFilter, TicketStore};
use tokio::sync::Mutex;
use uuid::Uuid;

/// [`TicketStore`] backed by a vector.
///
/// The lock is held across the count and the insert, so the per-VATIN
/// limit holds under concurrent issuing just as it does in Postgres.
#[derive(Default)]
pub struct MemoryTicketStore {
    tickets: Mutex<Vec<Ticket>>,
    unavailable: AtomicBool,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `tickets`.
    pub fn with_tickets(tickets: Vec<Ticket>) -> Self {
        Self {
            tickets: Mutex::new(tickets),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every operation fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the stored tickets.
    pub async fn tickets(&self) -> Vec<Ticket> {
        self.tickets.lock().await.clone()
    }

    fn check_available(&self) -> Result<(), TicketError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(TicketError::Database("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create_ticket(
        &self,
        ticket: Ticket,
        max_per_vatin: u32,
    ) -> Result<CreateTicketOutcome, TicketError> {
        self.check_available()?;
        let mut tickets = self.tickets.lock().await;

        let held = tickets.iter().filter(|t| t.vatin == ticket.vatin).count();
        if held >= max_per_vatin as usize {
            return Ok(CreateTicketOutcome::LimitReached);
        }

        tickets.push(ticket.clone());
        Ok(CreateTicketOutcome::Created(ticket))
    }

    async fn count_tickets(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        self.check_available()?;
        let tickets = self.tickets.lock().await;
        let count = match &filter.vatin {
            Some(vatin) => tickets.iter().filter(|t| &t.vatin == vatin).count(),
            None => tickets.len(),
        };
        Ok(count as i64)
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        Ok(self
            .tickets
            .lock()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn ping(&self) -> Result<(), TicketError> {
        self.check_available()
    }
}
