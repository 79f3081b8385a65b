//! Signed, time-bounded attestations of verified chains

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::crypto::{Hasher, Signer};
use crate::error::{DelegationError, Result};
use crate::types::{DelegationId, DelegationNode};

/// Contents of a verification proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    pub chain_length: usize,
    pub root_id: DelegationId,
    pub leaf_id: DelegationId,
    pub effective_permissions: BTreeSet<String>,
    pub verified_at: DateTime<Utc>,

    /// Digest over every node's `token_hash`, root first. Not the
    /// pairwise `link_hash` written at issuance.
    pub path_digest: String,
}

/// A signed proof and the claims it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationProof {
    pub token: String,
    pub claims: ProofClaims,
    pub expires_at: DateTime<Utc>,
}

/// Signs proofs with a fixed validity window
///
/// The window is independent of the delegations' own expiry so that a
/// stale "valid" answer cannot be relied on indefinitely.
pub struct ProofGenerator {
    signer: Arc<dyn Signer>,
    hasher: Arc<dyn Hasher>,
    validity: Duration,
}

impl ProofGenerator {
    pub fn new(signer: Arc<dyn Signer>, hasher: Arc<dyn Hasher>, validity: Duration) -> Self {
        Self {
            signer,
            hasher,
            validity,
        }
    }

    /// Digest of the concatenated token hashes along the chain
    pub fn path_digest(&self, chain: &[DelegationNode]) -> String {
        let concatenated: String = chain.iter().map(|n| n.token_hash.as_str()).collect();
        self.hasher.digest(concatenated.as_bytes())
    }

    /// Build and sign a proof for a chain that has already been verified
    pub fn generate_verification_proof(
        &self,
        chain: &[DelegationNode],
        effective_permissions: &BTreeSet<String>,
    ) -> Result<VerificationProof> {
        let (Some(root), Some(leaf)) = (chain.first(), chain.last()) else {
            return Err(DelegationError::InvalidInput(
                "cannot prove an empty chain".to_string(),
            ));
        };

        let verified_at = Utc::now();
        let claims = ProofClaims {
            chain_length: chain.len(),
            root_id: root.id.clone(),
            leaf_id: leaf.id.clone(),
            effective_permissions: effective_permissions.clone(),
            verified_at,
            path_digest: self.path_digest(chain),
        };

        let payload = serde_json::to_value(&claims)?;
        let token = self.signer.sign(&payload, self.validity)?;
        let validity = chrono::Duration::from_std(self.validity)
            .map_err(|e| DelegationError::Internal(format!("invalid proof validity: {}", e)))?;

        debug!("Generated proof for chain {} -> {}", claims.root_id, claims.leaf_id);

        Ok(VerificationProof {
            token,
            claims,
            expires_at: verified_at + validity,
        })
    }

    /// Check a proof token's signature and window and return its claims
    pub fn verify_proof(&self, token: &str) -> Result<ProofClaims> {
        let signed = self.signer.verify(token)?;
        Ok(serde_json::from_value(signed.payload)?)
    }
}
