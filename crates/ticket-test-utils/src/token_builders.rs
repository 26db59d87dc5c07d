//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed test tokens. Timestamps are
//! relative to [`TEST_NOW`], the instant the harness clock starts at.

use crate::crypto_fixtures::TestSigningKey;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Header, Validation};
use serde_json::{json, Map, Value};

/// Unix time the harness clock starts at.
pub const TEST_NOW: i64 = 1_700_000_000;

/// Issuer the harness trusts.
pub const TEST_ISSUER: &str = "https://issuer.example/";

/// Audience the harness accepts.
pub const TEST_AUDIENCE: &str = "api";

/// Builder for creating signed test JWTs
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_scope("tickets:write")
///     .expires_in(3600)
///     .sign(&TestRsaKey::primary());
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid: Option<Option<String>>,
}

impl TestTokenBuilder {
    /// Claims that the harness accepts: trusted issuer, accepted audience,
    /// issued at [`TEST_NOW`], valid for an hour.
    pub fn new() -> Self {
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("iat".to_string(), json!(TEST_NOW));
        claims.insert("exp".to_string(), json!(TEST_NOW + 3600));
        Self { claims, kid: None }
    }

    /// Set the subject (user/service)
    pub fn for_user(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Set the issuer
    pub fn issued_by(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// Set the audience; pass a JSON array for multiple audiences
    pub fn for_audience(self, audience: Value) -> Self {
        self.claim("aud", audience)
    }

    /// Set the scope (space-separated)
    pub fn with_scope(self, scope: &str) -> Self {
        self.claim("scope", json!(scope))
    }

    /// Set expiration in seconds after [`TEST_NOW`]; negative for expired
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", json!(TEST_NOW + seconds))
    }

    /// Set not-before in seconds after [`TEST_NOW`]
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.claim("nbf", json!(TEST_NOW + seconds))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.claim("iat", json!(timestamp))
    }

    /// Set an arbitrary claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Override the header kid; `None` omits it
    pub fn with_kid(mut self, kid: Option<&str>) -> Self {
        self.kid = Some(kid.map(ToString::to_string));
        self
    }

    /// The claims as a JSON value
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with `key`, using its kid and algorithm in the header
    pub fn sign(&self, key: &impl TestSigningKey) -> String {
        let mut header = Header::new(key.algorithm());
        header.kid = match &self.kid {
            Some(kid) => kid.clone(),
            None => Some(key.kid().to_string()),
        };

        jsonwebtoken::encode(&header, &self.claims, &key.encoding_key())
            .expect("test token must sign")
    }

    /// Token whose header names `alg` but carries a bogus signature
    ///
    /// For algorithms the fixtures cannot sign with (`none`, `HS256`).
    pub fn unsigned_with_alg(&self, alg: &str, kid: &str) -> String {
        let header = json!({"alg": alg, "typ": "JWT", "kid": kid});
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(Value::Object(self.claims.clone()).to_string()),
            URL_SAFE_NO_PAD.encode(b"not-a-signature"),
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a token signed by [`TestTokenBuilder::sign`] without checking
/// time claims. For asserting on what the builder produced.
pub fn decode_test_token(
    token: &str,
    key: &impl TestSigningKey,
    public: &jsonwebtoken::DecodingKey,
) -> Value {
    let mut validation = Validation::new(key.algorithm());
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    jsonwebtoken::decode::<Value>(token, public, &validation)
        .expect("test token must decode")
        .claims
}
