//! Cascading revocation of a delegation subtree
//!
//! Not transactional: every node is read and written on its own, so a
//! failure part way leaves a partially revoked subtree. Only `Active`
//! nodes are touched, which makes a retry safe and lets it finish the job.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ChainCache;
use crate::deadline::Deadline;
use crate::error::{DelegationError, Result};
use crate::store::TokenStore;
use crate::types::{AgentId, DelegationId, DelegationNode, DelegationStatus, RevocationMetadata};

/// A node the propagator could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationFailure {
    pub delegation_id: DelegationId,
    pub error: String,
}

/// Outcome of a subtree revocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevocationReport {
    /// Nodes moved from `Active` to `Revoked` by this call
    pub revoked_count: usize,
    pub revoked_ids: Vec<DelegationId>,

    /// Recipients of the revoked nodes
    pub affected_agents: BTreeSet<AgentId>,

    /// Per-node failures; retry the same root to finish
    pub failures: Vec<RevocationFailure>,
}

impl RevocationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Revokes a delegation and everything issued beneath it
pub struct RevocationPropagator {
    store: Arc<dyn TokenStore>,
    cache: Arc<ChainCache>,
}

impl RevocationPropagator {
    pub fn new(store: Arc<dyn TokenStore>, cache: Arc<ChainCache>) -> Self {
        Self { store, cache }
    }

    /// Revoke `root_id` and its whole descendant subtree
    ///
    /// Breadth-first from the root. Already revoked nodes are skipped and
    /// not counted. Cached chains ending at revoked nodes, and chains cached
    /// for any affected agent, are invalidated afterwards.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown root, store or deadline failure while
    /// loading it. Failures further down are collected in the report.
    pub async fn revoke_chain(
        &self,
        root_id: &str,
        reason: &str,
        revoked_by: &str,
        deadline: &Deadline,
    ) -> Result<RevocationReport> {
        let root = deadline
            .run("store.find_by_id", self.store.find_by_id(root_id))
            .await?
            .ok_or_else(|| DelegationError::NotFound(root_id.to_string()))?;

        let metadata = RevocationMetadata {
            reason: reason.to_string(),
            revoked_by: revoked_by.to_string(),
            revoked_at: Utc::now(),
        };

        let mut report = RevocationReport::default();
        let mut visited: HashSet<DelegationId> = HashSet::from([root.id.clone()]);
        let mut queue: VecDeque<DelegationNode> = VecDeque::from([root]);

        while let Some(node) = queue.pop_front() {
            if node.status == DelegationStatus::Active {
                let update = self.store.update_status(
                    &node.id,
                    DelegationStatus::Revoked,
                    Some(metadata.clone()),
                );

                match deadline.run("store.update_status", update).await {
                    Ok(()) => {
                        debug!("Revoked delegation {}", node.id);
                        report.revoked_count += 1;
                        report.revoked_ids.push(node.id.clone());
                        report.affected_agents.insert(node.recipient_agent_id.clone());
                    }
                    Err(e) => {
                        let stop = matches!(e, DelegationError::DeadlineExceeded(_));
                        report.failures.push(RevocationFailure {
                            delegation_id: node.id.clone(),
                            error: e.to_string(),
                        });
                        if stop {
                            break;
                        }
                    }
                }
            }

            match deadline
                .run("store.find_children", self.store.find_children(&node.id))
                .await
            {
                Ok(children) => {
                    for child in children {
                        if visited.insert(child.id.clone()) {
                            queue.push_back(child);
                        }
                    }
                }
                Err(e) => {
                    let stop = matches!(e, DelegationError::DeadlineExceeded(_));
                    report.failures.push(RevocationFailure {
                        delegation_id: node.id.clone(),
                        error: format!("listing children failed: {}", e),
                    });
                    if stop {
                        break;
                    }
                }
            }
        }

        for id in &report.revoked_ids {
            self.cache.invalidate(id, deadline).await;
        }
        for agent in &report.affected_agents {
            self.cache.invalidate_agent(agent, deadline).await;
        }

        if report.is_complete() {
            info!(
                "Revoked {} delegation(s) under {} ({}): {}",
                report.revoked_count, root_id, revoked_by, reason
            );
        } else {
            warn!(
                "Partially revoked subtree under {}: {} revoked, {} failure(s); retry to finish",
                root_id,
                report.revoked_count,
                report.failures.len()
            );
        }

        Ok(report)
    }
}
