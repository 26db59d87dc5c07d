//! JWT primitives shared by token-consuming services.
//!
//! This module provides the framework-free pieces of bearer-token validation:
//! - Size limits for DoS prevention
//! - Compact serialization splitting and base64url segment decoding
//! - Header decoding (`alg`, `kid`)
//! - The asymmetric algorithm allow-list
//! - Time-claim checks (`exp`, `nbf`, `iat`) against an explicit `now`
//!
//! Signature verification and key selection live in the consuming service,
//! which owns the key cache.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Symmetric (`HS*`) and `none` algorithms are never accepted
//! - Error messages are generic; details are logged at debug level only
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{split_token, decode_parts, decode_header, parse_algorithm};
//!
//! let parts = split_token(token)?;
//! let decoded = decode_parts(&parts)?;
//! let header = decode_header(&parts)?;
//! let alg = parse_algorithm(&header.alg)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical access tokens are well under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance applied to `exp`, `nbf` and `iat` checks.
///
/// Zero: time claims are evaluated exactly unless a leeway is configured.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(0);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Bounds misconfiguration that would otherwise keep expired tokens alive.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Algorithms a key-discovery document may legitimately publish.
pub const SUPPORTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced by the structural and time-claim checks in this module.
///
/// Display strings are intentionally generic to prevent information leakage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Not a three-segment compact JWT, bad base64url, or bad JSON.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Header `alg` is unknown, symmetric, or `none`.
    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm,

    /// `exp` is at or before `now - leeway`.
    #[error("The access token is invalid or expired")]
    Expired,

    /// `nbf` is after `now + leeway`.
    #[error("The access token is invalid or expired")]
    NotYetValid,

    /// `iat` is after `now + leeway`.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Token Structure
// =============================================================================

/// Borrowed view of the three segments of a compact JWT.
#[derive(Debug, Clone, Copy)]
pub struct TokenParts<'a> {
    /// base64url-encoded header.
    pub header: &'a str,

    /// base64url-encoded payload.
    pub payload: &'a str,

    /// base64url-encoded signature.
    pub signature: &'a str,

    /// `header.payload`, the exact bytes the signature covers.
    pub signing_input: &'a str,
}

/// The JOSE header fields needed to select and check a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm, as written in the token.
    pub alg: String,

    /// Key identifier.
    pub kid: String,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<serde_json::Value>,
    kid: Option<serde_json::Value>,
}

/// Split a compact JWT into its three segments.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` if it does not have exactly three non-empty segments
pub fn split_token(token: &str) -> Result<TokenParts<'_>, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or(JwtValidationError::MalformedToken)?;
    let (header, payload) = signing_input
        .split_once('.')
        .ok_or(JwtValidationError::MalformedToken)?;

    if payload.contains('.') {
        tracing::debug!(target: "common.jwt", "Token rejected: too many segments");
        return Err(JwtValidationError::MalformedToken);
    }

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty segment");
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(TokenParts {
        header,
        payload,
        signature,
        signing_input,
    })
}

/// Decode one base64url (no padding) segment.
///
/// # Errors
///
/// Returns `MalformedToken` if the segment is not valid base64url.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, JwtValidationError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })
}

/// Decoded payload and signature bytes of an already-split token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedParts {
    /// Raw claims JSON.
    pub payload: Vec<u8>,

    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

/// Decode the payload and signature segments.
///
/// Run before any key lookup so that undecodable tokens never reach the
/// key cache.
///
/// # Errors
///
/// Returns `MalformedToken` if either segment is not valid base64url.
pub fn decode_parts(parts: &TokenParts<'_>) -> Result<DecodedParts, JwtValidationError> {
    Ok(DecodedParts {
        payload: decode_segment(parts.payload)?,
        signature: decode_segment(parts.signature)?,
    })
}

/// Decode the JOSE header of an already-split token.
///
/// # Errors
///
/// - `MalformedToken` for bad base64url, bad JSON, or a missing/non-string `alg`
/// - `MissingKid` if `kid` is absent, not a string, or empty
pub fn decode_header(parts: &TokenParts<'_>) -> Result<TokenHeader, JwtValidationError> {
    let header_bytes = decode_segment(parts.header)?;

    let raw: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = raw
        .alg
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MalformedToken)?;

    // Empty kid is rejected: it can never match a published key
    let kid = raw
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}

/// Parse an algorithm name, accepting only asymmetric signature algorithms.
///
/// # Errors
///
/// Returns `UnsupportedAlgorithm` for `none`, `HS*`, and unknown names.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtValidationError> {
    let alg = Algorithm::from_str(name).map_err(|_| {
        tracing::debug!(target: "common.jwt", alg = %name, "Unknown JWT algorithm");
        JwtValidationError::UnsupportedAlgorithm
    })?;

    if SUPPORTED_ALGORITHMS.contains(&alg) {
        Ok(alg)
    } else {
        tracing::debug!(target: "common.jwt", alg = %name, "Algorithm not permitted");
        Err(JwtValidationError::UnsupportedAlgorithm)
    }
}

// =============================================================================
// Time Claims
// =============================================================================

// Safe cast: leeway is bounded to MAX_CLOCK_SKEW (600 seconds)
#[allow(clippy::cast_possible_wrap)]
fn leeway_secs(leeway: Duration) -> i64 {
    leeway.as_secs() as i64
}

/// Validate `exp` against `now`.
///
/// The token is valid while `now < exp + leeway`; at `exp + leeway` it is
/// already expired.
///
/// # Errors
///
/// Returns `Expired` if the validity window has closed.
pub fn validate_exp_at(exp: i64, leeway: Duration, now: i64) -> Result<(), JwtValidationError> {
    if now >= exp.saturating_add(leeway_secs(leeway)) {
        tracing::debug!(target: "common.jwt", exp = exp, now = now, "Token rejected: expired");
        return Err(JwtValidationError::Expired);
    }
    Ok(())
}

/// Validate `nbf` against `now`; valid iff `nbf <= now + leeway`.
///
/// # Errors
///
/// Returns `NotYetValid` if the token's validity window has not opened.
pub fn validate_nbf_at(nbf: i64, leeway: Duration, now: i64) -> Result<(), JwtValidationError> {
    if nbf > now.saturating_add(leeway_secs(leeway)) {
        tracing::debug!(target: "common.jwt", nbf = nbf, now = now, "Token rejected: not yet valid");
        return Err(JwtValidationError::NotYetValid);
    }
    Ok(())
}

/// Validate `iat` against `now`; valid iff `iat <= now + leeway`.
///
/// Rejects tokens that claim to have been issued in the future, which
/// indicates pre-generation or a badly skewed issuer clock.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is beyond the tolerance.
pub fn validate_iat_at(iat: i64, leeway: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(leeway_secs(leeway));
    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.cGF5bG9hZA.c2lnbmF0dXJl")
    }

    // -------------------------------------------------------------------------
    // Constants
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_clock_skew_is_zero() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::ZERO);
    }

    #[test]
    fn test_max_clock_skew_is_10_minutes() {
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // split_token
    // -------------------------------------------------------------------------

    #[test]
    fn test_split_token_three_segments() {
        let parts = split_token("aaa.bbb.ccc").unwrap();
        assert_eq!(parts.header, "aaa");
        assert_eq!(parts.payload, "bbb");
        assert_eq!(parts.signature, "ccc");
        assert_eq!(parts.signing_input, "aaa.bbb");
    }

    #[test]
    fn test_split_token_wrong_segment_count() {
        for token in ["", "single", "only.two", "not.a.valid.jwt", "a.b.c.d.e"] {
            assert_eq!(
                split_token(token).unwrap_err(),
                JwtValidationError::MalformedToken,
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_split_token_empty_segments() {
        for token in [".b.c", "a..c", "a.b.", ".."] {
            assert_eq!(
                split_token(token).unwrap_err(),
                JwtValidationError::MalformedToken
            );
        }
    }

    #[test]
    fn test_split_token_oversized() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            split_token(&oversized).unwrap_err(),
            JwtValidationError::TokenTooLarge
        );
    }

    #[test]
    fn test_split_token_at_size_limit() {
        let remaining = MAX_JWT_SIZE_BYTES - 2;
        let token = format!(
            "{}.{}.{}",
            "a".repeat(remaining / 2),
            "b".repeat(remaining - remaining / 2 - 1),
            "c"
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert!(split_token(&token).is_ok());
    }

    // -------------------------------------------------------------------------
    // decode_segment / decode_header
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_segment_rejects_padding_and_standard_alphabet() {
        assert!(decode_segment("aGVsbG8").is_ok());
        assert_eq!(
            decode_segment("aGVsbG8=").unwrap_err(),
            JwtValidationError::MalformedToken
        );
        assert_eq!(
            decode_segment("+/+/").unwrap_err(),
            JwtValidationError::MalformedToken
        );
    }

    #[test]
    fn test_decode_parts_valid() {
        let parts = split_token("e30.cGF5bG9hZA.c2lnbmF0dXJl").unwrap();
        let decoded = decode_parts(&parts).unwrap();
        assert_eq!(decoded.payload, b"payload");
        assert_eq!(decoded.signature, b"signature");
    }

    #[test]
    fn test_decode_parts_rejects_undecodable_payload_or_signature() {
        for token in ["e30.!!!notbase64!!!.c2ln", "e30.e30.!!!notbase64!!!", "e30.e30=.c2ln"] {
            let parts = split_token(token).unwrap();
            assert_eq!(
                decode_parts(&parts).unwrap_err(),
                JwtValidationError::MalformedToken,
                "token {token:?}"
            );
        }
    }

    #[test]
    fn test_decode_header_valid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);
        let parts = split_token(&token).unwrap();
        let header = decode_header(&parts).unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid, "key-01");
    }

    #[test]
    fn test_decode_header_missing_alg_is_malformed() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"key-01"}"#);
        let parts = split_token(&token).unwrap();
        assert_eq!(
            decode_header(&parts).unwrap_err(),
            JwtValidationError::MalformedToken
        );
    }

    #[test]
    fn test_decode_header_kid_variants() {
        for header in [
            r#"{"alg":"RS256"}"#,
            r#"{"alg":"RS256","kid":""}"#,
            r#"{"alg":"RS256","kid":null}"#,
            r#"{"alg":"RS256","kid":12345}"#,
        ] {
            let token = token_with_header(header);
            let parts = split_token(&token).unwrap();
            assert_eq!(
                decode_header(&parts).unwrap_err(),
                JwtValidationError::MissingKid,
                "header {header} should have no usable kid"
            );
        }
    }

    #[test]
    fn test_decode_header_invalid_json() {
        let token = token_with_header("not json");
        let parts = split_token(&token).unwrap();
        assert_eq!(
            decode_header(&parts).unwrap_err(),
            JwtValidationError::MalformedToken
        );
    }

    #[test]
    fn test_decode_header_invalid_base64() {
        let parts = split_token("!!!invalid!!!.payload.signature").unwrap();
        assert_eq!(
            decode_header(&parts).unwrap_err(),
            JwtValidationError::MalformedToken
        );
    }

    #[test]
    fn test_decode_header_kid_with_special_characters() {
        let token = token_with_header(r#"{"alg":"EdDSA","kid":"key-with-special_chars.123"}"#);
        let parts = split_token(&token).unwrap();
        assert_eq!(decode_header(&parts).unwrap().kid, "key-with-special_chars.123");
    }

    // -------------------------------------------------------------------------
    // parse_algorithm
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_algorithm_accepts_asymmetric() {
        assert_eq!(parse_algorithm("RS256").unwrap(), Algorithm::RS256);
        assert_eq!(parse_algorithm("PS512").unwrap(), Algorithm::PS512);
        assert_eq!(parse_algorithm("ES256").unwrap(), Algorithm::ES256);
        assert_eq!(parse_algorithm("EdDSA").unwrap(), Algorithm::EdDSA);
    }

    #[test]
    fn test_parse_algorithm_rejects_symmetric_and_none() {
        for name in ["HS256", "HS384", "HS512", "none", "None", "rs256", ""] {
            assert_eq!(
                parse_algorithm(name).unwrap_err(),
                JwtValidationError::UnsupportedAlgorithm,
                "{name} must not be accepted"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Time claims
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_exp_boundary_without_leeway() {
        let exp = 1_700_000_000_i64;
        assert!(validate_exp_at(exp, Duration::ZERO, exp - 1).is_ok());
        assert_eq!(
            validate_exp_at(exp, Duration::ZERO, exp).unwrap_err(),
            JwtValidationError::Expired
        );
        assert_eq!(
            validate_exp_at(exp, Duration::ZERO, exp + 1).unwrap_err(),
            JwtValidationError::Expired
        );
    }

    #[test]
    fn test_validate_exp_boundary_with_leeway() {
        let exp = 1_700_000_000_i64;
        let leeway = Duration::from_secs(30);
        assert!(validate_exp_at(exp, leeway, exp + 29).is_ok());
        assert_eq!(
            validate_exp_at(exp, leeway, exp + 30).unwrap_err(),
            JwtValidationError::Expired
        );
    }

    #[test]
    fn test_validate_nbf_boundary() {
        let now = 1_700_000_000_i64;
        assert!(validate_nbf_at(now, Duration::ZERO, now).is_ok());
        assert!(validate_nbf_at(now - 10, Duration::ZERO, now).is_ok());
        assert_eq!(
            validate_nbf_at(now + 1, Duration::ZERO, now).unwrap_err(),
            JwtValidationError::NotYetValid
        );
        assert!(validate_nbf_at(now + 5, Duration::from_secs(5), now).is_ok());
        assert_eq!(
            validate_nbf_at(now + 6, Duration::from_secs(5), now).unwrap_err(),
            JwtValidationError::NotYetValid
        );
    }

    #[test]
    fn test_validate_iat_boundary() {
        let now = 1_700_000_000_i64;
        let skew = Duration::from_secs(300);

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 300, skew, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, skew, now).unwrap_err(),
            JwtValidationError::IatTooFarInFuture
        );
        assert!(validate_iat_at(now - 3600, Duration::ZERO, now).is_ok());
    }

    #[test]
    fn test_validate_exp_saturates() {
        assert!(validate_exp_at(i64::MAX, MAX_CLOCK_SKEW, 0).is_ok());
    }
}
