//! Delegation engine facade
//!
//! Wires the store, agent directory, cache, signer and hasher into the
//! verifier, issuer and revocation propagator, and applies the configured
//! deadline to every operation.
//!
//! ```text
//! create_delegation ─┐
//!                    ├─→ ChainVerifier → [ChainCache] → ChainBuilder → TokenStore
//! verify_chain ──────┘         │                                        ↑
//!                              ├─→ AgentDirectory                       │
//!                              └─→ ConstraintNarrower, ProofGenerator   │
//! revoke_chain ──→ RevocationPropagator ──→ [ChainCache] ───────────────┘
//! ```

use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheBackend, CacheStats, ChainCache};
use crate::chain::ChainBuilder;
use crate::config::EngineConfig;
use crate::crypto::{Blake3Hasher, Ed25519Signer, Hasher, Signer};
use crate::deadline::Deadline;
use crate::error::{DelegationError, Result};
use crate::issuer::{DelegationIssuer, IssueRequest, IssuedDelegation};
use crate::proof::{ProofClaims, ProofGenerator};
use crate::revocation::{RevocationPropagator, RevocationReport};
use crate::store::{AgentDirectory, InMemoryAgentDirectory, InMemoryTokenStore, TokenStore};
use crate::verifier::{ChainVerificationResult, ChainVerifier};

/// Delegation chain authorization engine
pub struct DelegationEngine {
    config: EngineConfig,
    cache: Arc<ChainCache>,
    verifier: Arc<ChainVerifier>,
    issuer: DelegationIssuer,
    revoker: RevocationPropagator,
    proofs: Arc<ProofGenerator>,
}

impl DelegationEngine {
    pub fn builder() -> DelegationEngineBuilder {
        DelegationEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.operation_timeout())
    }

    /// Verify the chain ending at `leaf_id`
    pub async fn verify_chain(&self, leaf_id: &str) -> Result<ChainVerificationResult> {
        self.verifier.verify_chain(leaf_id, &self.deadline()).await
    }

    /// Issue a delegation, verifying its parent chain first
    pub async fn create_delegation(&self, request: IssueRequest) -> Result<IssuedDelegation> {
        self.issuer.create_delegation(request, &self.deadline()).await
    }

    /// Revoke `root_id` and every delegation beneath it
    pub async fn revoke_chain(
        &self,
        root_id: &str,
        reason: &str,
        revoked_by: &str,
    ) -> Result<RevocationReport> {
        self.revoker
            .revoke_chain(root_id, reason, revoked_by, &self.deadline())
            .await
    }

    /// Check a proof token issued by this engine
    pub fn verify_proof(&self, token: &str) -> Result<ProofClaims> {
        self.proofs.verify_proof(token)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop all locally cached chains
    pub async fn invalidate_cache(&self) {
        self.cache.clear().await;
        info!("Chain cache invalidated");
    }
}

/// Builder for [`DelegationEngine`]; unset collaborators use in-memory defaults
#[derive(Default)]
pub struct DelegationEngineBuilder {
    config: Option<EngineConfig>,
    store: Option<Arc<dyn TokenStore>>,
    directory: Option<Arc<dyn AgentDirectory>>,
    signer: Option<Arc<dyn Signer>>,
    hasher: Option<Arc<dyn Hasher>>,
    primary_cache: Option<Arc<dyn CacheBackend>>,
}

impl DelegationEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Shared cache tier placed in front of the local one
    pub fn primary_cache(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.primary_cache = Some(backend);
        self
    }

    pub fn build(self) -> Result<DelegationEngine> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| DelegationError::InvalidInput(format!("invalid config: {}", e)))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTokenStore::new()) as Arc<dyn TokenStore>);
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(InMemoryAgentDirectory::new()) as Arc<dyn AgentDirectory>);
        let signer = self
            .signer
            .unwrap_or_else(|| Arc::new(Ed25519Signer::generate()) as Arc<dyn Signer>);
        let hasher = self
            .hasher
            .unwrap_or_else(|| Arc::new(Blake3Hasher) as Arc<dyn Hasher>);

        let cache = Arc::new(ChainCache::new(config.cache.clone(), self.primary_cache));
        let proofs = Arc::new(ProofGenerator::new(
            signer.clone(),
            hasher.clone(),
            config.proof_validity(),
        ));

        let verifier = Arc::new(ChainVerifier::new(
            ChainBuilder::new(store.clone(), config.max_chain_hops),
            directory,
            cache.clone(),
            proofs.clone(),
        ));

        let issuer = DelegationIssuer::new(
            store.clone(),
            verifier.clone(),
            signer,
            hasher,
            config.max_token_ttl_secs.map(std::time::Duration::from_secs),
            config.max_chain_hops,
        );

        let revoker = RevocationPropagator::new(store, cache.clone());

        info!(
            "DelegationEngine initialized with max_chain_hops={}, cache_ttl={}s, proof_validity={}s",
            config.max_chain_hops, config.cache.ttl_secs, config.proof_validity_secs
        );

        Ok(DelegationEngine {
            config,
            cache,
            verifier,
            issuer,
            revoker,
            proofs,
        })
    }
}
