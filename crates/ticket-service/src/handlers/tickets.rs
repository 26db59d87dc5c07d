//! Ticket API handlers. All routes here sit behind the auth layer.

use crate::errors::TicketError;
use crate::middleware::AuthenticatedClaims;
use crate::models::{GenerateTicketRequest, GenerateTicketResponse, Ticket, TotalTickets};
use crate::observability::metrics;
use crate::repositories::{CreateTicketOutcome, TicketFilter};
use crate::routes::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for GET /api/tickets/total
#[instrument(skip_all, name = "ticket.api.total")]
pub async fn get_total_tickets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TotalTickets>, TicketError> {
    let total_tickets = state.store.count_tickets(&TicketFilter::all()).await?;
    Ok(Json(TotalTickets { total_tickets }))
}

/// Handler for GET /api/tickets/:id
///
/// 400 for an id that is not a UUID, 404 for an unknown ticket.
#[instrument(skip_all, name = "ticket.api.get")]
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, TicketError> {
    let id = Uuid::parse_str(&id).map_err(|_| {
        tracing::debug!(target: "ticket.api", "Invalid ticket ID");
        TicketError::BadRequest("Invalid ticket ID".to_string())
    })?;

    state
        .store
        .get_ticket(id)
        .await?
        .map(Json)
        .ok_or_else(|| TicketError::NotFound("Ticket not found".to_string()))
}

/// Handler for POST /api/generate
///
/// Issues a ticket unless the VATIN already holds the configured maximum.
/// Returns the ticket id and its public URL.
#[instrument(skip_all, name = "ticket.api.generate")]
pub async fn generate_ticket(
    State(state): State<Arc<AppState>>,
    AuthenticatedClaims(claims): AuthenticatedClaims,
    body: Result<Json<GenerateTicketRequest>, JsonRejection>,
) -> Result<Json<GenerateTicketResponse>, TicketError> {
    if let Some(scope) = &state.config.tickets_write_scope {
        if !claims.has_scope(scope) {
            return Err(TicketError::Forbidden("Insufficient scope".to_string()));
        }
    }

    let Json(request) = body.map_err(|e| {
        tracing::debug!(target: "ticket.api", error = %e, "Invalid request body");
        TicketError::BadRequest("Invalid request body".to_string())
    })?;

    let vatin = request.vatin.trim();
    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    if vatin.is_empty() || first_name.is_empty() || last_name.is_empty() {
        return Err(TicketError::BadRequest(
            "vatin, firstName and lastName are required".to_string(),
        ));
    }

    let ticket = Ticket::new(
        vatin.to_string(),
        first_name.to_string(),
        last_name.to_string(),
    );

    match state
        .store
        .create_ticket(ticket, state.config.max_tickets_per_vatin)
        .await?
    {
        CreateTicketOutcome::Created(ticket) => {
            metrics::record_ticket_issued("created");
            tracing::info!(target: "ticket.api", ticket_id = %ticket.id, "Ticket issued");
            Ok(Json(GenerateTicketResponse {
                id: ticket.id,
                url: format!("{}/{}", state.config.client_url, ticket.id),
            }))
        }
        CreateTicketOutcome::LimitReached => {
            metrics::record_ticket_issued("limit_reached");
            Err(TicketError::BadRequest(
                "Maximum number of tickets reached".to_string(),
            ))
        }
    }
}
