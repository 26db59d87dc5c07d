//! Custom claim validators run after all built-in claim checks pass.

use crate::auth::claims::Claims;

/// An application-defined check over validated claims.
///
/// Returning `Err(reason)` rejects the token with
/// `AuthError::CustomClaimRejected(reason)`. The reason is logged, never
/// sent to the client.
pub trait ClaimsValidator: Send + Sync {
    fn validate(&self, claims: &Claims) -> Result<(), String>;
}

impl<F> ClaimsValidator for F
where
    F: Fn(&Claims) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, claims: &Claims) -> Result<(), String> {
        self(claims)
    }
}

/// Checks that `scope`, if present, is a list of space-delimited tokens.
///
/// Each scope token must be printable ASCII excluding `"` and `\`
/// (RFC 6749 §3.3). An empty `scope` string is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeFormatValidator;

impl ClaimsValidator for ScopeFormatValidator {
    fn validate(&self, claims: &Claims) -> Result<(), String> {
        let Some(scope) = claims.scope.as_deref() else {
            return Ok(());
        };

        if scope.split(' ').any(str::is_empty) {
            return Err("scope must be space-delimited tokens".to_string());
        }

        let valid_char = |c: char| c == '!' || ('#'..='[').contains(&c) || (']'..='~').contains(&c);
        if !scope.split(' ').all(|token| token.chars().all(valid_char)) {
            return Err("scope contains invalid characters".to_string());
        }

        Ok(())
    }
}
