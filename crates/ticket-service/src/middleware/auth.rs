//! Authentication gate for protected routes.
//!
//! [`AuthLayer`] wraps any HTTP service so the inner service only runs
//! after the request's bearer token validates. Every rejection produces the
//! same 401 response; the inner service is never called for it.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/api/generate", post(generate))
//!     .route_layer(AuthLayer::new(validator));
//! ```

use crate::auth::{Claims, JwtValidator};
use crate::errors::{unauthorized_response, AuthError, TicketError};
use crate::observability::metrics;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, Request},
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};

/// Default budget for validating one request's token, key fetch included.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Tower layer that puts [`AuthService`] in front of a service.
#[derive(Clone)]
pub struct AuthLayer {
    jwt_validator: Arc<JwtValidator>,
    timeout: Duration,
}

impl AuthLayer {
    /// Create a new auth layer with the default timeout.
    pub fn new(jwt_validator: Arc<JwtValidator>) -> Self {
        Self {
            jwt_validator,
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Override the per-request validation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            jwt_validator: Arc::clone(&self.jwt_validator),
            timeout: self.timeout,
        }
    }
}

/// Tower service that authenticates requests before calling `inner`.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    jwt_validator: Arc<JwtValidator>,
    timeout: Duration,
}

impl<S, ReqBody> Service<Request<ReqBody>> for AuthService<S>
where
    S: Service<Request<ReqBody>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The clone that was polled ready serves this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let jwt_validator = Arc::clone(&self.jwt_validator);
        let timeout = self.timeout;

        Box::pin(async move {
            let start = Instant::now();

            // Owned; holding `&req` across an await is not Send for a !Sync body
            let token = bearer_token(&req).map(str::to_owned);

            let result = match token {
                Some(token) => {
                    match tokio::time::timeout(timeout, jwt_validator.validate(&token)).await {
                        Ok(result) => result,
                        Err(_) => {
                            metrics::record_token_validation(
                                "error",
                                AuthError::Timeout.kind(),
                                start.elapsed(),
                            );
                            Err(AuthError::Timeout)
                        }
                    }
                }
                None => {
                    metrics::record_token_validation(
                        "error",
                        AuthError::MissingCredentials.kind(),
                        start.elapsed(),
                    );
                    Err(AuthError::MissingCredentials)
                }
            };

            match result {
                Ok(claims) => {
                    let (mut parts, body) = req.into_parts();
                    parts.extensions.insert(AuthenticatedClaims(claims));
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(e) => {
                    log_rejection(&e, req.uri().path());
                    Ok(unauthorized_response())
                }
            }
        })
    }
}

fn log_rejection(error: &AuthError, path: &str) {
    match error {
        AuthError::KeyFetchUnavailable | AuthError::Timeout => {
            tracing::warn!(target: "ticket.middleware.auth", error = error.kind(), path = %path, "Request rejected");
        }
        _ => {
            tracing::debug!(target: "ticket.middleware.auth", error = error.kind(), path = %path, "Request rejected");
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is case-sensitive and separated by exactly one space.
fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;

    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }

    Some(token)
}

/// Claims of the request's validated token, stored in request extensions.
#[derive(Clone, Debug)]
pub struct AuthenticatedClaims(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedClaims
where
    S: Send + Sync,
{
    type Rejection = TicketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedClaims>()
            .cloned()
            .ok_or(TicketError::Unauthorized(AuthError::MissingCredentials))
    }
}

/// Extension trait for extracting claims from request.
pub trait ClaimsExt {
    /// Get the authenticated claims from request extensions.
    ///
    /// Returns `None` if the auth layer was not applied to this request.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions()
            .get::<AuthenticatedClaims>()
            .map(|AuthenticatedClaims(claims)| claims)
    }
}
