//! Bearer token validation for the ticket service.
//!
//! Validates access tokens issued by the trusted identity provider using
//! public keys from its key-discovery endpoint. Checks run in a fixed order
//! and stop at the first failure:
//!
//! 1. Structure (three base64url segments, size limit)
//! 2. Header `alg` against the allow-list
//! 3. Key lookup by `kid` through [`JwksClient`]
//! 4. Signature over `header.payload`
//! 5. Claims: `iss`, `aud`, `exp`, `nbf`, `iat`, then custom validators

use crate::auth::claims::Claims;
use crate::auth::clock::Clock;
use crate::auth::jwks::JwksClient;
use crate::auth::validators::ClaimsValidator;
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{
    decode_header, decode_parts, parse_algorithm, split_token, validate_exp_at,
    validate_iat_at, validate_nbf_at, JwtValidationError, DEFAULT_CLOCK_SKEW,
};
use jsonwebtoken::Algorithm;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// What a token must match to be accepted.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Trusted issuer; `iss` must equal this exactly.
    pub issuer: String,

    /// Audience this service accepts; `aud` must contain it.
    pub audience: String,

    /// Signing algorithms accepted in the token header.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Clock skew tolerance for `exp`, `nbf` and `iat`.
    pub leeway: Duration,
}

impl ValidatorConfig {
    /// RS256 only, no leeway.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            allowed_algorithms: vec![Algorithm::RS256],
            leeway: DEFAULT_CLOCK_SKEW,
        }
    }
}

/// JWT validator for the ticket service.
///
/// Shares the key cache; safe to wrap in an `Arc` and use from any number
/// of concurrent requests.
pub struct JwtValidator {
    jwks: JwksClient,
    config: ValidatorConfig,
    clock: Arc<dyn Clock>,
    claims_validators: Vec<Arc<dyn ClaimsValidator>>,
}

impl JwtValidator {
    /// Create a new JWT validator.
    pub fn new(jwks: JwksClient, config: ValidatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            jwks,
            config,
            clock,
            claims_validators: Vec::new(),
        }
    }

    /// Add a custom claim validator. Validators run in insertion order,
    /// after every built-in check has passed.
    #[must_use]
    pub fn with_claims_validator(mut self, validator: impl ClaimsValidator + 'static) -> Self {
        self.claims_validators.push(Arc::new(validator));
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn jwks(&self) -> &JwksClient {
        &self.jwks
    }

    /// Validate a bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuthError`] encountered. The raw token is never
    /// logged.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let start = Instant::now();
        let result = self.validate_token(token).await;

        match &result {
            Ok(_) => metrics::record_token_validation("success", "none", start.elapsed()),
            Err(e) => {
                tracing::debug!(target: "ticket.auth.jwt", error = e.kind(), "Token rejected");
                metrics::record_token_validation("error", e.kind(), start.elapsed());
            }
        }

        result
    }

    async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let parts = split_token(token).map_err(|_| AuthError::MalformedToken)?;
        let decoded = decode_parts(&parts).map_err(|_| AuthError::MalformedToken)?;

        let header = decode_header(&parts).map_err(|e| match e {
            JwtValidationError::MissingKid => AuthError::UnknownSigningKey,
            _ => AuthError::MalformedToken,
        })?;

        let algorithm =
            parse_algorithm(&header.alg).map_err(|_| AuthError::UnsupportedAlgorithm)?;
        if !self.config.allowed_algorithms.contains(&algorithm) {
            tracing::debug!(target: "ticket.auth.jwt", alg = %header.alg, "Algorithm not in allow-list");
            return Err(AuthError::UnsupportedAlgorithm);
        }

        let key = self.jwks.get_key(&header.kid).await?;

        // The key's published algorithm is authoritative
        if key.algorithm() != algorithm {
            tracing::debug!(
                target: "ticket.auth.jwt",
                alg = %header.alg,
                kid = %header.kid,
                "Token algorithm does not match key"
            );
            return Err(AuthError::UnsupportedAlgorithm);
        }

        let verified = jsonwebtoken::crypto::verify(
            parts.signature,
            parts.signing_input.as_bytes(),
            key.decoding_key(),
            algorithm,
        )
        .map_err(|e| {
            tracing::debug!(target: "ticket.auth.jwt", error = %e, "Signature verification failed");
            AuthError::InvalidSignature
        })?;
        if !verified {
            return Err(AuthError::InvalidSignature);
        }

        let claims: Claims = serde_json::from_slice(&decoded.payload).map_err(|e| {
            tracing::debug!(target: "ticket.auth.jwt", error = %e, "Failed to decode claims");
            AuthError::MalformedToken
        })?;

        self.validate_claims(&claims)?;

        Ok(claims)
    }

    fn validate_claims(&self, claims: &Claims) -> Result<(), AuthError> {
        if claims.iss != self.config.issuer {
            return Err(AuthError::IssuerMismatch);
        }

        if !claims.aud.contains(&self.config.audience) {
            return Err(AuthError::AudienceMismatch);
        }

        let now = self.clock.now().timestamp();
        let leeway = self.config.leeway;

        validate_exp_at(claims.exp, leeway, now).map_err(|_| AuthError::TokenExpired)?;

        if let Some(nbf) = claims.nbf {
            validate_nbf_at(nbf, leeway, now).map_err(|_| AuthError::TokenNotYetValid)?;
        }

        if let Some(iat) = claims.iat {
            validate_iat_at(iat, leeway, now).map_err(|_| AuthError::TokenNotYetValid)?;
        }

        for validator in &self.claims_validators {
            match catch_unwind(AssertUnwindSafe(|| validator.validate(claims))) {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    tracing::debug!(target: "ticket.auth.jwt", reason = %reason, "Custom claim check failed");
                    return Err(AuthError::CustomClaimRejected(reason));
                }
                Err(_) => {
                    tracing::warn!(target: "ticket.auth.jwt", "Custom claim validator panicked");
                    return Err(AuthError::MalformedToken);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::jwks::JwksConfig;
    use crate::auth::validators::ScopeFormatValidator;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use chrono::{TimeZone, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ISSUER: &str = "https://issuer.example/";
    const AUDIENCE: &str = "api";
    const NOW: i64 = 1_700_000_000;
    const KEY_PEM: &str = include_str!("../../../ticket-test-utils/fixtures/rsa_test_key_1.pem");
    const KEY_MODULUS: &str = include_str!("../../../ticket-test-utils/fixtures/rsa_test_key_1.n");

    struct Fixture {
        server: MockServer,
        clock: Arc<ManualClock>,
        validator: JwtValidator,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kty": "RSA",
                    "kid": "key-1",
                    "alg": "RS256",
                    "use": "sig",
                    "n": KEY_MODULUS.trim(),
                    "e": "AQAB"
                }]
            })))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(NOW, 0).unwrap()));
        let jwks = JwksClient::new(
            JwksConfig::new(format!("{}/.well-known/jwks.json", server.uri())),
            clock.clone(),
        );
        let validator = JwtValidator::new(jwks, ValidatorConfig::new(ISSUER, AUDIENCE), clock.clone());

        Fixture {
            server,
            clock,
            validator,
        }
    }

    fn claims() -> serde_json::Value {
        json!({
            "iss": ISSUER,
            "sub": "auth0|user-1",
            "aud": AUDIENCE,
            "exp": NOW + 3600,
            "iat": NOW,
            "scope": "tickets:write"
        })
    }

    fn sign_with(kid: &str, alg: Algorithm, claims: &serde_json::Value) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(KEY_PEM.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    fn sign(claims: &serde_json::Value) -> String {
        sign_with("key-1", Algorithm::RS256, claims)
    }

    fn raw_token(header: &serde_json::Value, claims: &serde_json::Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    #[tokio::test]
    async fn test_valid_token_returns_claims() {
        let f = fixture().await;
        let validated = f.validator.validate(&sign(&claims())).await.unwrap();

        assert_eq!(validated.iss, ISSUER);
        assert_eq!(validated.sub, "auth0|user-1");
        assert!(validated.has_scope("tickets:write"));
        assert_eq!(serde_json::to_value(&validated).unwrap(), claims());
    }

    #[tokio::test]
    async fn test_audience_list_membership() {
        let f = fixture().await;
        let mut c = claims();
        c["aud"] = json!(["https://issuer.example/userinfo", AUDIENCE]);
        assert!(f.validator.validate(&sign(&c)).await.is_ok());

        c["aud"] = json!(["other", "api2"]);
        assert_eq!(
            f.validator.validate(&sign(&c)).await.unwrap_err(),
            AuthError::AudienceMismatch
        );
    }

    #[tokio::test]
    async fn test_issuer_must_match_exactly() {
        let f = fixture().await;
        let mut c = claims();
        c["iss"] = json!("https://issuer.example");
        assert_eq!(
            f.validator.validate(&sign(&c)).await.unwrap_err(),
            AuthError::IssuerMismatch
        );
    }

    #[tokio::test]
    async fn test_malformed_tokens() {
        let f = fixture().await;
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig", "a..c"] {
            assert_eq!(
                f.validator.validate(token).await.unwrap_err(),
                AuthError::MalformedToken,
                "token {token:?}"
            );
        }

        let oversized = "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            f.validator.validate(&oversized).await.unwrap_err(),
            AuthError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_undecodable_segments_are_malformed_without_key_lookup() {
        let f = fixture().await;
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "RS256", "kid": "key-1"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(claims().to_string());

        for token in [
            format!("{header}.!!!notbase64!!!.c2ln"),
            format!("{header}.{payload}.!!!notbase64!!!"),
        ] {
            assert_eq!(
                f.validator.validate(&token).await.unwrap_err(),
                AuthError::MalformedToken,
                "token {token:?}"
            );
        }

        let requests = f.server.received_requests().await.unwrap();
        assert!(requests.is_empty(), "no key fetch for undecodable tokens");
        assert_eq!(f.validator.jwks().key_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejects_none_and_symmetric_algorithms() {
        let f = fixture().await;
        for alg in ["none", "HS256", "rs256"] {
            let token = raw_token(&json!({"alg": alg, "kid": "key-1"}), &claims());
            assert_eq!(
                f.validator.validate(&token).await.unwrap_err(),
                AuthError::UnsupportedAlgorithm,
                "alg {alg}"
            );
        }
    }

    #[tokio::test]
    async fn test_rejects_supported_algorithm_outside_allow_list() {
        let f = fixture().await;
        let token = sign_with("key-1", Algorithm::PS256, &claims());
        assert_eq!(
            f.validator.validate(&token).await.unwrap_err(),
            AuthError::UnsupportedAlgorithm
        );
    }

    #[tokio::test]
    async fn test_rejects_algorithm_that_does_not_match_key() {
        let f = fixture().await;
        let mut config = ValidatorConfig::new(ISSUER, AUDIENCE);
        config.allowed_algorithms = vec![Algorithm::RS256, Algorithm::RS384];
        let validator = JwtValidator::new(f.validator.jwks().clone(), config, f.clock.clone());

        let token = sign_with("key-1", Algorithm::RS384, &claims());
        assert_eq!(
            validator.validate(&token).await.unwrap_err(),
            AuthError::UnsupportedAlgorithm
        );
    }

    #[tokio::test]
    async fn test_missing_or_unknown_kid() {
        let f = fixture().await;
        let token = raw_token(&json!({"alg": "RS256"}), &claims());
        assert_eq!(
            f.validator.validate(&token).await.unwrap_err(),
            AuthError::UnknownSigningKey
        );

        let token = sign_with("key-unknown", Algorithm::RS256, &claims());
        assert_eq!(
            f.validator.validate(&token).await.unwrap_err(),
            AuthError::UnknownSigningKey
        );
    }

    #[tokio::test]
    async fn test_single_bit_flip_in_signature_is_rejected() {
        let f = fixture().await;
        let token = sign(&claims());
        let (signing_input, signature) = token.rsplit_once('.').unwrap();
        let mut sig = URL_SAFE_NO_PAD.decode(signature).unwrap();

        for byte in [0, sig.len() / 2, sig.len() - 1] {
            for bit in [0, 7] {
                sig[byte] ^= 1 << bit;
                let tampered = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(&sig));
                assert_eq!(
                    f.validator.validate(&tampered).await.unwrap_err(),
                    AuthError::InvalidSignature
                );
                sig[byte] ^= 1 << bit;
            }
        }
    }

    #[tokio::test]
    async fn test_tampered_payload_is_rejected() {
        let f = fixture().await;
        let token = sign(&claims());
        let (header, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let mut forged = claims();
        forged["scope"] = json!("admin");
        let tampered = format!(
            "{header}.{}.{signature}",
            URL_SAFE_NO_PAD.encode(forged.to_string())
        );

        assert_eq!(
            f.validator.validate(&tampered).await.unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_exact() {
        let f = fixture().await;
        let token = sign(&claims());

        f.clock.set(Utc.timestamp_opt(NOW + 3599, 0).unwrap());
        assert!(f.validator.validate(&token).await.is_ok());

        f.clock.set(Utc.timestamp_opt(NOW + 3600, 0).unwrap());
        assert_eq!(
            f.validator.validate(&token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_leeway_extends_expiry() {
        let f = fixture().await;
        let mut config = ValidatorConfig::new(ISSUER, AUDIENCE);
        config.leeway = Duration::from_secs(30);
        let validator = JwtValidator::new(f.validator.jwks().clone(), config, f.clock.clone());
        let token = sign(&claims());

        f.clock.set(Utc.timestamp_opt(NOW + 3629, 0).unwrap());
        assert!(validator.validate(&token).await.is_ok());

        f.clock.set(Utc.timestamp_opt(NOW + 3630, 0).unwrap());
        assert_eq!(
            validator.validate(&token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_not_before_and_future_iat() {
        let f = fixture().await;

        let mut c = claims();
        c["nbf"] = json!(NOW + 60);
        let token = sign(&c);
        assert_eq!(
            f.validator.validate(&token).await.unwrap_err(),
            AuthError::TokenNotYetValid
        );
        f.clock.set(Utc.timestamp_opt(NOW + 60, 0).unwrap());
        assert!(f.validator.validate(&token).await.is_ok());

        let mut c = claims();
        c["iat"] = json!(NOW + 600);
        assert_eq!(
            f.validator.validate(&sign(&c)).await.unwrap_err(),
            AuthError::TokenNotYetValid
        );
    }

    #[tokio::test]
    async fn test_claims_without_exp_are_malformed() {
        let f = fixture().await;
        let mut c = claims();
        c.as_object_mut().unwrap().remove("exp");
        assert_eq!(
            f.validator.validate(&sign(&c)).await.unwrap_err(),
            AuthError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_custom_validator_runs_last() {
        let f = fixture().await;
        let validator = JwtValidator::new(
            f.validator.jwks().clone(),
            ValidatorConfig::new(ISSUER, AUDIENCE),
            f.clock.clone(),
        )
        .with_claims_validator(ScopeFormatValidator)
        .with_claims_validator(|c: &Claims| {
            if c.has_scope("tickets:write") {
                Ok(())
            } else {
                Err("missing tickets:write".to_string())
            }
        });

        assert!(validator.validate(&sign(&claims())).await.is_ok());

        let mut c = claims();
        c["scope"] = json!("tickets:read");
        assert_eq!(
            validator.validate(&sign(&c)).await.unwrap_err(),
            AuthError::CustomClaimRejected("missing tickets:write".to_string())
        );

        // Built-in failures win over custom ones
        c["aud"] = json!("other");
        assert_eq!(
            validator.validate(&sign(&c)).await.unwrap_err(),
            AuthError::AudienceMismatch
        );
    }

    #[tokio::test]
    async fn test_panicking_custom_validator_is_malformed() {
        let f = fixture().await;
        let validator = JwtValidator::new(
            f.validator.jwks().clone(),
            ValidatorConfig::new(ISSUER, AUDIENCE),
            f.clock.clone(),
        )
        .with_claims_validator(|_: &Claims| -> Result<(), String> { panic!("validator bug") });

        assert_eq!(
            validator.validate(&sign(&claims())).await.unwrap_err(),
            AuthError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let f = fixture().await;
        let token = sign(&claims());
        let first = f.validator.validate(&token).await.unwrap();
        let second = f.validator.validate(&token).await.unwrap();
        assert_eq!(first, second);
    }
}
