//! Chain verification: cache, build, per-node and cross-node checks
//!
//! Verification never raises for an invalid chain. Callers inspect
//! [`ChainVerificationResult::valid`]; `Err` is reserved for store, cache,
//! directory, signing and deadline failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ChainCache;
use crate::chain::{is_well_linked, ChainBuilder};
use crate::deadline::Deadline;
use crate::error::{DelegationError, Result};
use crate::narrower::{self, EffectiveConstraints};
use crate::proof::{ProofGenerator, VerificationProof};
use crate::store::AgentDirectory;
use crate::types::{AgentRecord, ChainIssue, DelegationNode, DelegationStatus, IssueCode};

/// Outcome of verifying the chain ending at a leaf delegation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    pub valid: bool,

    /// Root (index 0) to leaf
    pub chain: Vec<DelegationNode>,

    /// Computed even when invalid, for diagnostics
    pub effective_permissions: BTreeSet<String>,
    pub effective_constraints: EffectiveConstraints,

    pub errors: Vec<ChainIssue>,
    pub warnings: Vec<ChainIssue>,

    /// Only present when valid
    pub verification_proof: Option<VerificationProof>,

    /// Answered from the chain cache without touching the store
    #[serde(default)]
    pub from_cache: bool,
}

impl ChainVerificationResult {
    fn invalid(issue: ChainIssue) -> Self {
        Self {
            valid: false,
            chain: Vec::new(),
            effective_permissions: BTreeSet::new(),
            effective_constraints: EffectiveConstraints::default(),
            errors: vec![issue],
            warnings: Vec::new(),
            verification_proof: None,
            from_cache: false,
        }
    }

    /// Chain length, which is also the depth a child of the leaf would get
    pub fn chain_length(&self) -> usize {
        self.chain.len()
    }

    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    pub fn has_warning(&self, code: IssueCode) -> bool {
        self.warnings.iter().any(|issue| issue.code == code)
    }
}

/// Orchestrates chain verification
pub struct ChainVerifier {
    builder: ChainBuilder,
    directory: Arc<dyn AgentDirectory>,
    cache: Arc<ChainCache>,
    proofs: Arc<ProofGenerator>,
}

impl ChainVerifier {
    pub fn new(
        builder: ChainBuilder,
        directory: Arc<dyn AgentDirectory>,
        cache: Arc<ChainCache>,
        proofs: Arc<ProofGenerator>,
    ) -> Self {
        Self {
            builder,
            directory,
            cache,
            proofs,
        }
    }

    /// Verify the chain ending at `leaf_id`
    ///
    /// # Pipeline
    ///
    /// 1. Cached chain passing the quick check (linked, all active, none expired)
    /// 2. Otherwise build the chain from the store
    /// 3. Per-node checks: revoked, expired, expiry vs parent, depth limit,
    ///    issuer and recipient liveness
    /// 4. Narrow permissions and constraints (always)
    /// 5. If valid: cache the chain and sign a proof
    pub async fn verify_chain(
        &self,
        leaf_id: &str,
        deadline: &Deadline,
    ) -> Result<ChainVerificationResult> {
        if let Some(result) = self.verify_cached(leaf_id, deadline).await? {
            return Ok(result);
        }

        let built = match self.builder.build_chain(leaf_id, deadline).await {
            Ok(built) => built,
            Err(DelegationError::ParentChainCorrupt { hops, .. }) => {
                return Ok(ChainVerificationResult::invalid(ChainIssue::new(
                    IssueCode::ParentChainCorrupt,
                    leaf_id,
                    format!("parent links loop or exceed bound after {} hops", hops),
                )));
            }
            Err(e) => return Err(e),
        };

        if built.is_empty() {
            debug!("Delegation {} not found", leaf_id);
            return Ok(ChainVerificationResult::invalid(ChainIssue::new(
                IssueCode::NotFound,
                leaf_id,
                "delegation not found",
            )));
        }

        let now = Utc::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Some(missing) = &built.missing_parent {
            errors.push(ChainIssue::new(
                IssueCode::ChainTruncated,
                built.nodes[0].id.clone(),
                format!("parent {} is missing, chain does not reach a root", missing),
            ));
        }

        let mut agents: HashMap<String, Option<AgentRecord>> = HashMap::new();

        for (i, node) in built.nodes.iter().enumerate() {
            let parent = if i > 0 { built.nodes.get(i - 1) } else { None };

            self.check_node(node, parent, now, &mut errors, &mut warnings);

            let issuer = self.agent(&node.issuer_agent_id, &mut agents, deadline).await?;
            if !issuer.as_ref().is_some_and(AgentRecord::is_active) {
                errors.push(ChainIssue::new(
                    IssueCode::IssuerInactive,
                    node.id.clone(),
                    format!("issuer {} is missing or inactive", node.issuer_agent_id),
                ));
            }

            let recipient = self.agent(&node.recipient_agent_id, &mut agents, deadline).await?;
            if !recipient.as_ref().is_some_and(AgentRecord::is_active) {
                warnings.push(ChainIssue::new(
                    IssueCode::RecipientInactive,
                    node.id.clone(),
                    format!("recipient {} is missing or inactive", node.recipient_agent_id),
                ));
            }
        }

        for conflict in narrower::currency_conflicts(&built.nodes) {
            warnings.push(ChainIssue::new(
                IssueCode::CurrencyMismatch,
                conflict.delegation_id,
                format!("currency {} differs from chain currency {}", conflict.found, conflict.expected),
            ));
        }

        let grant = narrower::narrow(&built.nodes);
        let valid = errors.is_empty();

        let verification_proof = if valid {
            self.cache.put(&built.nodes, deadline).await;
            Some(
                self.proofs
                    .generate_verification_proof(&built.nodes, &grant.permissions)?,
            )
        } else {
            None
        };

        if valid {
            info!("Chain for {} verified ({} nodes)", leaf_id, built.nodes.len());
        } else {
            info!("Chain for {} invalid: {} error(s)", leaf_id, errors.len());
        }

        Ok(ChainVerificationResult {
            valid,
            chain: built.nodes,
            effective_permissions: grant.permissions,
            effective_constraints: grant.constraints,
            errors,
            warnings,
            verification_proof,
            from_cache: false,
        })
    }

    /// Answer from cache if the cached chain still passes the quick check
    async fn verify_cached(
        &self,
        leaf_id: &str,
        deadline: &Deadline,
    ) -> Result<Option<ChainVerificationResult>> {
        let Some(chain) = self.cache.get(leaf_id, deadline).await else {
            return Ok(None);
        };

        let now = Utc::now();
        let leaf_matches = chain.last().is_some_and(|leaf| leaf.id == leaf_id);
        let passes = leaf_matches
            && is_well_linked(&chain)
            && chain.iter().all(|node| node.is_usable_at(now));

        if !passes {
            debug!("Cached chain for {} failed quick check, rebuilding", leaf_id);
            self.cache.invalidate(leaf_id, deadline).await;
            return Ok(None);
        }

        let grant = narrower::narrow(&chain);
        let proof = self
            .proofs
            .generate_verification_proof(&chain, &grant.permissions)?;

        debug!("Chain for {} served from cache", leaf_id);

        Ok(Some(ChainVerificationResult {
            valid: true,
            chain,
            effective_permissions: grant.permissions,
            effective_constraints: grant.constraints,
            errors: Vec::new(),
            warnings: Vec::new(),
            verification_proof: Some(proof),
            from_cache: true,
        }))
    }

    fn check_node(
        &self,
        node: &DelegationNode,
        parent: Option<&DelegationNode>,
        now: DateTime<Utc>,
        errors: &mut Vec<ChainIssue>,
        warnings: &mut Vec<ChainIssue>,
    ) {
        if node.status == DelegationStatus::Revoked {
            let reason = node
                .revocation
                .as_ref()
                .map(|r| r.reason.as_str())
                .unwrap_or("no reason recorded");
            errors.push(ChainIssue::new(
                IssueCode::Revoked,
                node.id.clone(),
                format!("delegation revoked: {}", reason),
            ));
        }

        if node.is_expired_at(now) {
            errors.push(ChainIssue::new(
                IssueCode::Expired,
                node.id.clone(),
                format!("delegation expired at {}", node.expires_at),
            ));
        }

        let Some(parent) = parent else {
            return;
        };

        if node.expires_at > parent.expires_at {
            warnings.push(ChainIssue::new(
                IssueCode::ExpiryExceedsParent,
                node.id.clone(),
                format!(
                    "expires at {} after parent {} ({})",
                    node.expires_at, parent.id, parent.expires_at
                ),
            ));
        }

        if let Some(max_depth) = parent.constraints.max_delegation_depth {
            if node.depth > max_depth {
                errors.push(ChainIssue::new(
                    IssueCode::DepthExceeded,
                    node.id.clone(),
                    format!("depth {} exceeds parent limit {}", node.depth, max_depth),
                ));
            }
        }
    }

    async fn agent(
        &self,
        agent_id: &str,
        memo: &mut HashMap<String, Option<AgentRecord>>,
        deadline: &Deadline,
    ) -> Result<Option<AgentRecord>> {
        if let Some(record) = memo.get(agent_id) {
            return Ok(record.clone());
        }

        let record = deadline
            .run("directory.find_by_id", self.directory.find_by_id(agent_id))
            .await?;
        if record.is_none() {
            warn!("Agent {} not found in directory", agent_id);
        }

        memo.insert(agent_id.to_string(), record.clone());
        Ok(record)
    }
}
