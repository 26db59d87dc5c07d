//! Deterministic cryptographic fixtures for testing
//!
//! RSA keys are checked-in PEM fixtures; Ed25519 keys are derived from a
//! seed. Every fixture can be published as a JWK and used to sign tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};
use thiserror::Error;

const RSA_KEY_1_PEM: &str = include_str!("../fixtures/rsa_test_key_1.pem");
const RSA_KEY_1_MODULUS: &str = include_str!("../fixtures/rsa_test_key_1.n");
const RSA_KEY_2_PEM: &str = include_str!("../fixtures/rsa_test_key_2.pem");
const RSA_KEY_2_MODULUS: &str = include_str!("../fixtures/rsa_test_key_2.n");

/// Public exponent of both RSA fixtures (65537).
pub const RSA_EXPONENT: &str = "AQAB";

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// A key that can sign test tokens and be published in a JWKS document.
pub trait TestSigningKey {
    /// Key ID placed in the token header and the JWK.
    fn kid(&self) -> &str;

    /// Algorithm placed in the token header and the JWK.
    fn algorithm(&self) -> Algorithm;

    /// Private key for signing.
    fn encoding_key(&self) -> EncodingKey;

    /// Public key as a JWK object.
    fn jwk(&self) -> Value;
}

/// One of the two checked-in 2048-bit RSA key pairs.
#[derive(Debug, Clone)]
pub struct TestRsaKey {
    kid: String,
    algorithm: Algorithm,
    private_pem: &'static str,
    modulus: &'static str,
}

impl TestRsaKey {
    /// First fixture key, kid `key-1`, RS256.
    pub fn primary() -> Self {
        Self {
            kid: "key-1".to_string(),
            algorithm: Algorithm::RS256,
            private_pem: RSA_KEY_1_PEM,
            modulus: RSA_KEY_1_MODULUS.trim(),
        }
    }

    /// Second fixture key, kid `key-2`, RS256. Used as the rotated-in key.
    pub fn secondary() -> Self {
        Self {
            kid: "key-2".to_string(),
            algorithm: Algorithm::RS256,
            private_pem: RSA_KEY_2_PEM,
            modulus: RSA_KEY_2_MODULUS.trim(),
        }
    }

    /// Same key material under a different kid.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Same key material for another RSA algorithm (RS384, PS256, ...).
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Base64url modulus of the public key.
    pub fn modulus(&self) -> &str {
        self.modulus
    }
}

impl TestSigningKey for TestRsaKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.private_pem.as_bytes())
            .expect("RSA fixture PEM must parse")
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "kid": self.kid,
            "alg": algorithm_name(self.algorithm),
            "n": self.modulus,
            "e": RSA_EXPONENT,
        })
    }
}

/// Ed25519 key pair derived deterministically from a seed byte.
#[derive(Debug, Clone)]
pub struct TestEd25519Key {
    kid: String,
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl TestEd25519Key {
    /// Generate a deterministic Ed25519 key.
    ///
    /// The same seed always produces the same keypair, ensuring test reproducibility.
    pub fn from_seed(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).map_err(|e| {
            FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e))
        })?;

        Ok(Self {
            kid: kid.to_string(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
            public_key: key_pair.public_key().as_ref().to_vec(),
        })
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl TestSigningKey for TestEd25519Key {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ed_der(&self.pkcs8)
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "use": "sig",
            "kid": self.kid,
            "alg": "EdDSA",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key),
        })
    }
}

/// JOSE name of an algorithm, as written in headers and JWKs.
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { INTEGER 0, SEQUENCE { OID 1.3.101.112 }, OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = vec![0x30, 0x2e];
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}
