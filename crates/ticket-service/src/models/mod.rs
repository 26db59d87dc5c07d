//! Data models for the ticket service.
//!
//! Wire formats use camelCase field names, except `total_tickets`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An issued ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub vatin: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// A new ticket with a random id, created now.
    pub fn new(vatin: String, first_name: String, last_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            vatin,
            first_name,
            last_name,
            created_at: Utc::now(),
        }
    }
}

/// Response body for `GET /api/tickets/total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalTickets {
    pub total_tickets: i64,
}

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTicketRequest {
    pub vatin: String,
    pub first_name: String,
    pub last_name: String,
}

/// Response body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTicketResponse {
    pub id: Uuid,

    /// Public URL of the ticket, for rendering as a QR code.
    pub url: String,
}

/// Readiness probe response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Signing key availability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadinessResponse {
    /// Every dependency answered.
    pub fn ready() -> Self {
        Self {
            status: "ready",
            database: Some("healthy"),
            jwks: Some("available"),
            error: None,
        }
    }

    /// A dependency failed; `jwks` is `None` when it was not checked.
    pub fn not_ready(database: &'static str, jwks: Option<&'static str>) -> Self {
        Self {
            status: "not_ready",
            database: Some(database),
            jwks,
            error: Some("Service dependencies unavailable".to_string()),
        }
    }
}
