//! Authentication module for the ticket service.
//!
//! Validates bearer tokens from the trusted identity provider. Provides:
//! - Key cache for the issuer's published signing keys
//! - JWT validation with an injectable clock
//! - Claims extraction and custom claim validators

pub mod claims;
pub mod clock;
pub mod jwks;
pub mod jwt;
pub mod validators;

pub use claims::{Audience, Claims};
pub use clock::{Clock, ManualClock, SystemClock};
pub use jwks::{JwksClient, JwksConfig, SigningKey};
pub use jwt::{JwtValidator, ValidatorConfig};
pub use validators::{ClaimsValidator, ScopeFormatValidator};
