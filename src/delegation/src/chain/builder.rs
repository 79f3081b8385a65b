//! Backward walk from a leaf delegation to its root

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::error::{DelegationError, Result};
use crate::store::TokenStore;
use crate::types::{DelegationId, DelegationNode};

/// Result of walking parent links
#[derive(Debug, Clone, Default)]
pub struct BuiltChain {
    /// Root (index 0) to leaf
    pub nodes: Vec<DelegationNode>,

    /// Set when the walk stopped at a parent id the store could not resolve
    pub missing_parent: Option<DelegationId>,
}

impl BuiltChain {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first node claims a parent that was not found
    pub fn is_truncated(&self) -> bool {
        self.missing_parent.is_some()
    }
}

/// Builds root-to-leaf chains from parent pointers in the token store
pub struct ChainBuilder {
    store: Arc<dyn TokenStore>,
    max_hops: usize,
}

impl ChainBuilder {
    /// # Arguments
    ///
    /// * `store` - Token store to read from
    /// * `max_hops` - Nodes fetched before the walk is declared corrupt
    pub fn new(store: Arc<dyn TokenStore>, max_hops: usize) -> Self {
        Self { store, max_hops }
    }

    /// Walk `parent_id` links from `leaf_id` up to the root
    ///
    /// A missing leaf yields an empty chain. A missing ancestor truncates the
    /// chain and is reported through [`BuiltChain::missing_parent`].
    ///
    /// # Errors
    ///
    /// `ParentChainCorrupt` when a node repeats or the hop bound is reached,
    /// plus any store or deadline failure.
    pub async fn build_chain(&self, leaf_id: &str, deadline: &Deadline) -> Result<BuiltChain> {
        let mut nodes: Vec<DelegationNode> = Vec::new();
        let mut visited: HashSet<DelegationId> = HashSet::new();
        let mut missing_parent = None;
        let mut current = leaf_id.to_string();

        loop {
            if nodes.len() >= self.max_hops {
                warn!("Chain walk from {} exceeded {} hops", leaf_id, self.max_hops);
                return Err(DelegationError::ParentChainCorrupt {
                    leaf_id: leaf_id.to_string(),
                    hops: nodes.len(),
                });
            }

            let found = deadline
                .run("store.find_by_id", self.store.find_by_id(&current))
                .await?;

            let Some(node) = found else {
                if !nodes.is_empty() {
                    warn!("Chain from {} truncated at missing parent {}", leaf_id, current);
                    missing_parent = Some(current);
                }
                break;
            };

            if !visited.insert(node.id.clone()) {
                warn!("Cycle in parent links at {} while walking from {}", node.id, leaf_id);
                return Err(DelegationError::ParentChainCorrupt {
                    leaf_id: leaf_id.to_string(),
                    hops: nodes.len(),
                });
            }

            let parent = node.parent_id.clone();
            nodes.push(node);

            match parent {
                Some(parent_id) => current = parent_id,
                None => break,
            }
        }

        nodes.reverse();
        debug!("Built chain of {} nodes for {}", nodes.len(), leaf_id);

        Ok(BuiltChain {
            nodes,
            missing_parent,
        })
    }
}
