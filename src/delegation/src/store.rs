//! Delegation record storage and agent directory

use crate::error::{DelegationError, Result};
use crate::types::{
    AgentId, AgentRecord, AgentStatus, DelegationId, DelegationNode, DelegationStatus,
    NewDelegation, RevocationMetadata,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persisted delegation records
///
/// Implementations must provide read-your-writes within one call sequence.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Get a delegation by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<DelegationNode>>;

    /// All delegations whose parent is `parent_id`
    async fn find_children(&self, parent_id: &str) -> Result<Vec<DelegationNode>>;

    /// Persist a new delegation as `Active`
    async fn create(&self, fields: NewDelegation) -> Result<DelegationNode>;

    /// Change the persisted status of a delegation
    async fn update_status(
        &self,
        id: &str,
        status: DelegationStatus,
        revocation: Option<RevocationMetadata>,
    ) -> Result<()>;
}

/// Agent liveness lookup
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn find_by_id(&self, agent_id: &str) -> Result<Option<AgentRecord>>;
}

/// In-memory token store
pub struct InMemoryTokenStore {
    nodes: Arc<RwLock<HashMap<DelegationId, DelegationNode>>>,
}

impl InMemoryTokenStore {
    /// Create a new in-memory token store
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace a node verbatim (imports and fixtures)
    pub async fn insert_node(&self, node: DelegationNode) {
        let mut nodes = self.nodes.write().await;
        nodes.insert(node.id.clone(), node);
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<DelegationNode>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.get(id).cloned())
    }

    async fn find_children(&self, parent_id: &str) -> Result<Vec<DelegationNode>> {
        let nodes = self.nodes.read().await;
        let mut children: Vec<DelegationNode> = nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();

        // Stable order for traversal
        children.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.id.cmp(&b.id)));

        Ok(children)
    }

    async fn create(&self, fields: NewDelegation) -> Result<DelegationNode> {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&fields.id) {
            return Err(DelegationError::Store(format!(
                "delegation {} already exists",
                fields.id
            )));
        }

        let node = fields.into_node();
        nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn update_status(
        &self,
        id: &str,
        status: DelegationStatus,
        revocation: Option<RevocationMetadata>,
    ) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| DelegationError::NotFound(id.to_string()))?;

        node.status = status;
        if revocation.is_some() {
            node.revocation = revocation;
        }
        Ok(())
    }
}

/// In-memory agent directory
pub struct InMemoryAgentDirectory {
    agents: Arc<RwLock<HashMap<AgentId, AgentRecord>>>,
}

impl InMemoryAgentDirectory {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register or update an agent
    pub async fn upsert(&self, agent_id: impl Into<String>, status: AgentStatus) {
        let agent_id = agent_id.into();
        let mut agents = self.agents.write().await;
        agents.insert(agent_id.clone(), AgentRecord::new(agent_id, status));
    }

    /// Register several agents as active
    pub async fn activate_all<I, S>(&self, agent_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in agent_ids {
            self.upsert(id, AgentStatus::Active).await;
        }
    }
}

impl Default for InMemoryAgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn find_by_id(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        let agents = self.agents.read().await;
        Ok(agents.get(agent_id).cloned())
    }
}
