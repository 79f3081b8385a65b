//! Two-tier cache of verified chains
//!
//! Precedence:
//!
//! - **read**: primary tier; the local tier is consulted only when the
//!   primary call fails
//! - **write**: primary best-effort, local always
//! - **invalidate**: primary best-effort, local always
//!
//! The tiers are never reconciled. After a primary outage the local tier
//! may keep serving an entry until its own TTL lapses. Every primary
//! failure is logged and counted in [`CacheStats::primary_failures`].

pub mod backend;

pub use backend::{CacheBackend, InMemoryCacheBackend};

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::deadline::Deadline;
use crate::types::{AgentId, DelegationId, DelegationNode};

/// Cached chain with insertion time and the agents it is indexed under
#[derive(Clone)]
struct CachedEntry {
    chain: Vec<DelegationNode>,
    agents: HashSet<AgentId>,
    cached_at: Instant,
}

impl CachedEntry {
    fn new(chain: Vec<DelegationNode>) -> Self {
        let agents = chain
            .iter()
            .flat_map(|node| [node.issuer_agent_id.clone(), node.recipient_agent_id.clone()])
            .collect();
        Self {
            chain,
            agents,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, config: &CacheConfig) -> bool {
        self.cached_at.elapsed() > config.ttl()
    }
}

/// Verified-chain cache keyed by leaf delegation id
pub struct ChainCache {
    /// Shared tier, absent when running local-only
    primary: Option<Arc<dyn CacheBackend>>,

    /// Process-local tier
    local: Arc<DashMap<DelegationId, CachedEntry>>,

    /// Agent -> leaf ids of cached chains the agent takes part in
    agent_index: Arc<DashMap<AgentId, HashSet<DelegationId>>>,

    config: CacheConfig,

    stats: Arc<DashMap<String, usize>>,
}

impl ChainCache {
    /// Cache with a primary tier in front of the local one
    pub fn new(config: CacheConfig, primary: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            primary,
            local: Arc::new(DashMap::new()),
            agent_index: Arc::new(DashMap::new()),
            config,
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Local tier only
    pub fn local_only(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    fn primary_key(&self, leaf_id: &str) -> String {
        format!("{}{}", self.config.key_prefix, leaf_id)
    }

    /// Look up the cached chain ending at `leaf_id`
    pub async fn get(&self, leaf_id: &str, deadline: &Deadline) -> Option<Vec<DelegationNode>> {
        if let Some(primary) = &self.primary {
            let key = self.primary_key(leaf_id);
            match deadline.run("cache.get", primary.get(&key)).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<Vec<DelegationNode>>(&bytes) {
                    Ok(chain) => {
                        self.increment_stat("hits");
                        return Some(chain);
                    }
                    Err(e) => {
                        warn!("Discarding undecodable cache entry {}: {}", key, e);
                        let _ = deadline.run("cache.delete", primary.delete(&key)).await;
                        self.increment_stat("misses");
                        return None;
                    }
                },
                Ok(None) => {
                    self.increment_stat("misses");
                    return None;
                }
                Err(e) => {
                    warn!("Primary cache read failed, using local tier: {}", e);
                    self.increment_stat("primary_failures");
                }
            }
        }

        self.get_local(leaf_id)
    }

    fn get_local(&self, leaf_id: &str) -> Option<Vec<DelegationNode>> {
        if let Some(entry) = self.local.get(leaf_id) {
            if entry.is_expired(&self.config) {
                drop(entry);
                self.remove_local(leaf_id);
                self.increment_stat("expirations");
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.chain.clone());
        }

        self.increment_stat("misses");
        None
    }

    /// Store a verified chain under its leaf id
    pub async fn put(&self, chain: &[DelegationNode], deadline: &Deadline) {
        let Some(leaf) = chain.last() else {
            return;
        };
        let leaf_id = leaf.id.clone();

        if let Some(primary) = &self.primary {
            match serde_json::to_vec(chain) {
                Ok(bytes) => {
                    let key = self.primary_key(&leaf_id);
                    let write = primary.set(&key, bytes, self.config.ttl_secs);
                    if let Err(e) = deadline.run("cache.set", write).await {
                        warn!("Primary cache write failed for {}: {}", leaf_id, e);
                        self.increment_stat("primary_failures");
                    }
                }
                Err(e) => warn!("Failed to encode chain {} for cache: {}", leaf_id, e),
            }
        }

        // A replaced entry may have involved other agents
        self.remove_local(&leaf_id);
        if self.local.len() >= self.config.local_capacity {
            self.evict_oldest();
        }

        let entry = CachedEntry::new(chain.to_vec());
        for agent in &entry.agents {
            self.agent_index
                .entry(agent.clone())
                .or_default()
                .insert(leaf_id.clone());
        }
        self.local.insert(leaf_id.clone(), entry);

        debug!("Cached chain of {} nodes for {}", chain.len(), leaf_id);
    }

    /// Drop the chain cached under `leaf_id`
    pub async fn invalidate(&self, leaf_id: &str, deadline: &Deadline) {
        if let Some(primary) = &self.primary {
            let key = self.primary_key(leaf_id);
            if let Err(e) = deadline.run("cache.delete", primary.delete(&key)).await {
                warn!("Primary cache invalidation failed for {}: {}", leaf_id, e);
                self.increment_stat("primary_failures");
            }
        }

        self.remove_local(leaf_id);
        self.increment_stat("invalidations");
    }

    /// Drop every chain this process cached that involves `agent_id`
    ///
    /// Returns the number of leaf keys invalidated.
    pub async fn invalidate_agent(&self, agent_id: &str, deadline: &Deadline) -> usize {
        let Some((_, leaves)) = self.agent_index.remove(agent_id) else {
            return 0;
        };

        for leaf_id in &leaves {
            self.invalidate(leaf_id, deadline).await;
        }

        leaves.len()
    }

    /// Clear the local tier and its agent index
    ///
    /// The primary tier cannot be enumerated and keeps its entries until TTL.
    pub async fn clear(&self) {
        self.local.clear();
        self.agent_index.clear();
        self.stats.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            invalidations: self.get_stat("invalidations"),
            primary_failures: self.get_stat("primary_failures"),
            entries: self.local.len(),
            max_entries: self.config.local_capacity,
        }
    }

    /// Evict the oldest tenth of the local tier
    fn evict_oldest(&self) {
        let to_remove = (self.config.local_capacity / 10).max(1);

        let mut ages: Vec<(DelegationId, Instant)> = self
            .local
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().cached_at))
            .collect();
        ages.sort_by_key(|(_, cached_at)| *cached_at);

        for (leaf_id, _) in ages.into_iter().take(to_remove) {
            self.remove_local(&leaf_id);
        }
    }

    /// Remove a local entry and its agent index references
    fn remove_local(&self, leaf_id: &str) {
        let Some((_, entry)) = self.local.remove(leaf_id) else {
            return;
        };

        for agent in &entry.agents {
            let now_empty = match self.agent_index.get_mut(agent) {
                Some(mut leaves) => {
                    leaves.remove(leaf_id);
                    leaves.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.agent_index.remove_if(agent, |_, leaves| leaves.is_empty());
            }
        }
    }

    fn increment_stat(&self, key: &str) {
        self.stats
            .entry(key.to_string())
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub invalidations: usize,
    pub primary_failures: usize,
    /// Entries in the local tier
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
