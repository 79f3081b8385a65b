//! Delegation issuance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{Hasher, Signer};
use crate::deadline::Deadline;
use crate::error::{DelegationError, Result};
use crate::store::TokenStore;
use crate::types::{AgentId, Constraints, DelegationId, DelegationNode, NewDelegation};
use crate::verifier::ChainVerifier;

/// Parameters of a new delegation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    pub issuer_agent_id: AgentId,
    pub recipient_agent_id: AgentId,
    pub constraints: Constraints,
    pub expires_at: DateTime<Utc>,

    /// Delegation this one is carved out of; `None` issues a root
    #[serde(default)]
    pub parent_token_id: Option<DelegationId>,
}

impl IssueRequest {
    /// Root delegation request
    pub fn root(
        issuer: impl Into<String>,
        recipient: impl Into<String>,
        constraints: Constraints,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer_agent_id: issuer.into(),
            recipient_agent_id: recipient.into(),
            constraints,
            expires_at,
            parent_token_id: None,
        }
    }

    /// Re-delegate from `parent_id`
    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_token_id = Some(parent_id.into());
        self
    }
}

/// A persisted delegation and its signed token
#[derive(Debug, Clone)]
pub struct IssuedDelegation {
    pub node: DelegationNode,
    pub token: String,
}

/// Creates delegations, verifying the parent chain first
pub struct DelegationIssuer {
    store: Arc<dyn TokenStore>,
    verifier: Arc<ChainVerifier>,
    signer: Arc<dyn Signer>,
    hasher: Arc<dyn Hasher>,
    max_token_ttl: Option<Duration>,

    /// Longest chain the verifier will walk; deeper grants could never verify
    max_chain_hops: usize,
}

impl DelegationIssuer {
    pub fn new(
        store: Arc<dyn TokenStore>,
        verifier: Arc<ChainVerifier>,
        signer: Arc<dyn Signer>,
        hasher: Arc<dyn Hasher>,
        max_token_ttl: Option<Duration>,
        max_chain_hops: usize,
    ) -> Self {
        Self {
            store,
            verifier,
            signer,
            hasher,
            max_token_ttl,
            max_chain_hops,
        }
    }

    /// Issue a delegation
    ///
    /// # Errors
    ///
    /// - `ParentChainInvalid` with the parent's verification errors
    /// - `DepthExceeded` when the parent chain's depth limit or the
    ///   configured hop bound is reached
    /// - `InvalidInput` for bad parties or expiry
    ///
    /// Nothing is written on any error.
    pub async fn create_delegation(
        &self,
        request: IssueRequest,
        deadline: &Deadline,
    ) -> Result<IssuedDelegation> {
        let now = Utc::now();
        let ttl = self.validate(&request, now)?;

        let depth = match &request.parent_token_id {
            Some(parent_id) => self.depth_under(parent_id, &request, deadline).await?,
            None => 1,
        };

        let id = Uuid::new_v4().to_string();
        let payload = json!({
            "delegation_id": id,
            "issuer_agent_id": request.issuer_agent_id,
            "recipient_agent_id": request.recipient_agent_id,
            "constraints": request.constraints,
            "parent_id": request.parent_token_id,
            "depth": depth,
            "issued_at": now,
            "expires_at": request.expires_at,
        });

        let token = self.signer.sign(&payload, ttl)?;
        let token_hash = self.hasher.digest(token.as_bytes());
        let link_hash = match &request.parent_token_id {
            Some(parent_id) => self
                .hasher
                .digest(format!("{}{}", parent_id, token_hash).as_bytes()),
            None => token_hash.clone(),
        };

        let fields = NewDelegation {
            id,
            issuer_agent_id: request.issuer_agent_id,
            recipient_agent_id: request.recipient_agent_id,
            constraints: request.constraints,
            issued_at: now,
            expires_at: request.expires_at,
            token_hash,
            link_hash,
            parent_id: request.parent_token_id,
            depth,
        };

        let node = deadline
            .run("store.create", self.store.create(fields))
            .await?;

        info!(
            "Issued delegation {} from {} to {} at depth {}",
            node.id, node.issuer_agent_id, node.recipient_agent_id, node.depth
        );

        Ok(IssuedDelegation { node, token })
    }

    fn validate(&self, request: &IssueRequest, now: DateTime<Utc>) -> Result<Duration> {
        if request.issuer_agent_id.is_empty() || request.recipient_agent_id.is_empty() {
            return Err(DelegationError::InvalidInput(
                "issuer and recipient are required".to_string(),
            ));
        }

        if request.issuer_agent_id == request.recipient_agent_id {
            return Err(DelegationError::InvalidInput(
                "an agent cannot delegate to itself".to_string(),
            ));
        }

        let ttl = (request.expires_at - now).to_std().map_err(|_| {
            DelegationError::InvalidInput("expires_at must be in the future".to_string())
        })?;
        if ttl.is_zero() {
            return Err(DelegationError::InvalidInput(
                "expires_at must be in the future".to_string(),
            ));
        }

        if let Some(window) = &request.constraints.time_window {
            if !window.is_well_formed() {
                return Err(DelegationError::InvalidInput(format!(
                    "time window {}..{} is not a span within 0..24",
                    window.start_hour, window.end_hour
                )));
            }
        }

        if let Some(max) = self.max_token_ttl {
            if ttl > max {
                return Err(DelegationError::InvalidInput(format!(
                    "lifetime {}s exceeds maximum {}s",
                    ttl.as_secs(),
                    max.as_secs()
                )));
            }
        }

        Ok(ttl)
    }

    /// Verify the parent chain and derive the new depth from its length
    async fn depth_under(
        &self,
        parent_id: &str,
        request: &IssueRequest,
        deadline: &Deadline,
    ) -> Result<u32> {
        let parent = self.verifier.verify_chain(parent_id, deadline).await?;

        if !parent.valid {
            warn!("Refusing issuance under invalid parent {}", parent_id);
            return Err(DelegationError::ParentChainInvalid {
                parent_id: parent_id.to_string(),
                issues: parent.errors,
            });
        }

        let Some(parent_leaf) = parent.chain.last() else {
            return Err(DelegationError::NotFound(parent_id.to_string()));
        };

        if parent_leaf.recipient_agent_id != request.issuer_agent_id {
            return Err(DelegationError::InvalidInput(format!(
                "issuer {} is not the recipient of parent {}",
                request.issuer_agent_id, parent_id
            )));
        }

        let depth = u32::try_from(parent.chain_length() + 1)
            .map_err(|_| DelegationError::Internal("chain length overflow".to_string()))?;

        if let Some(max) = parent.effective_constraints.max_delegation_depth {
            if depth > max {
                return Err(DelegationError::DepthExceeded { depth, max });
            }
        }

        if depth as usize > self.max_chain_hops {
            warn!(
                "Refusing issuance under {}: depth {} exceeds max_chain_hops {}",
                parent_id, depth, self.max_chain_hops
            );
            return Err(DelegationError::DepthExceeded {
                depth,
                max: u32::try_from(self.max_chain_hops).unwrap_or(u32::MAX),
            });
        }

        debug!("New delegation under {} gets depth {}", parent_id, depth);
        Ok(depth)
    }
}
