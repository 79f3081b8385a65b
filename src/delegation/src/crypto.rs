//! Signing and hashing seams
//!
//! The engine only sees the [`Signer`] and [`Hasher`] traits. Ed25519 and
//! BLAKE3 are the default implementations.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DelegationError, Result};

/// Claims recovered from a verified token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedClaims {
    pub payload: serde_json::Value,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Produces and verifies opaque signed tokens
pub trait Signer: Send + Sync {
    /// Sign `payload`, valid for `ttl`
    fn sign(&self, payload: &serde_json::Value, ttl: Duration) -> Result<String>;

    /// Check signature and validity window, returning the claims
    fn verify(&self, token: &str) -> Result<SignedClaims>;
}

/// Fixed-length hex digests
pub trait Hasher: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> String;
}

/// BLAKE3 hex digests (64 chars)
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}

/// Ed25519 token signer
///
/// Token layout: `base64url(claims_json).base64url(signature)`, where the
/// signature covers the first segment.
pub struct Ed25519Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519Signer {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Load from a 32-byte secret
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, payload: &serde_json::Value, ttl: Duration) -> Result<String> {
        let issued_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DelegationError::Signing(format!("invalid ttl: {}", e)))?;

        let claims = SignedClaims {
            payload: payload.clone(),
            issued_at,
            expires_at: issued_at + ttl,
        };

        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = self.signing_key.sign(body.as_bytes());

        Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(signature.to_bytes())))
    }

    fn verify(&self, token: &str) -> Result<SignedClaims> {
        let (body, signature) = token
            .split_once('.')
            .ok_or_else(|| DelegationError::Signing("malformed token".to_string()))?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| DelegationError::Signing(format!("bad signature encoding: {}", e)))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| DelegationError::Signing(format!("bad signature: {}", e)))?;

        self.verifying_key
            .verify(body.as_bytes(), &signature)
            .map_err(|_| DelegationError::Signing("signature mismatch".to_string()))?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| DelegationError::Signing(format!("bad claims encoding: {}", e)))?;
        let claims: SignedClaims = serde_json::from_slice(&claims_bytes)?;

        if Utc::now() > claims.expires_at {
            return Err(DelegationError::Signing("token expired".to_string()));
        }

        Ok(claims)
    }
}
