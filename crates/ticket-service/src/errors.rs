//! Ticket service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are intentionally generic; the detailed
//! cause is logged server-side. Every authentication failure produces the
//! same 401 body regardless of why the token was rejected.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why a request failed authentication.
///
/// These are recoverable per-request failures. They are logged and counted
/// by kind, but never exposed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("malformed token")]
    MalformedToken,

    #[error("unknown signing key")]
    UnknownSigningKey,

    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    TokenExpired,

    #[error("token not yet valid")]
    TokenNotYetValid,

    #[error("custom claim rejected: {0}")]
    CustomClaimRejected(String),

    #[error("missing credentials")]
    MissingCredentials,

    #[error("signing keys unavailable")]
    KeyFetchUnavailable,

    #[error("authentication timed out")]
    Timeout,
}

impl AuthError {
    /// Stable, low-cardinality name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnknownSigningKey => "unknown_signing_key",
            AuthError::UnsupportedAlgorithm => "unsupported_algorithm",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::CustomClaimRejected(_) => "custom_claim_rejected",
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::KeyFetchUnavailable => "key_fetch_unavailable",
            AuthError::Timeout => "timeout",
        }
    }
}

/// Ticket service error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 with the fixed `{"error":"invalid_token"}` body
/// - Forbidden: 403
/// - BadRequest: 400
/// - NotFound: 404
/// - Database, Internal: 500
/// - ServiceUnavailable: 503
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl TicketError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            TicketError::Unauthorized(_) => 401,
            TicketError::Forbidden(_) => 403,
            TicketError::BadRequest(_) => 400,
            TicketError::NotFound(_) => 404,
            TicketError::Database(_) | TicketError::Internal => 500,
            TicketError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct UnauthorizedBody {
    error: &'static str,
}

/// The uniform response for every rejected credential.
///
/// Status 401, body `{"error":"invalid_token"}`, and a `WWW-Authenticate`
/// challenge. The failure kind is deliberately absent.
pub fn unauthorized_response() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(UnauthorizedBody {
            error: "invalid_token",
        }),
    )
        .into_response();

    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer error=\"invalid_token\""),
    );

    response
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            TicketError::Unauthorized(_) => return unauthorized_response(),
            TicketError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            TicketError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            TicketError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            TicketError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "ticket.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            TicketError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "ticket.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            TicketError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to TicketError
impl From<sqlx::Error> for TicketError {
    fn from(err: sqlx::Error) -> Self {
        TicketError::Database(err.to_string())
    }
}
