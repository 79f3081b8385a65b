//! Shared fixtures for delegation engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use cretoai_delegation::{
    Constraints, DelegationEngine, DelegationNode, EngineConfig, InMemoryAgentDirectory,
    InMemoryCacheBackend, InMemoryTokenStore, IssueRequest, NewDelegation, TokenStore,
};
use std::sync::Arc;

pub const PLATFORM: &str = "agent:platform";
pub const ROOT_AGENT: &str = "agent:r";
pub const AGENT_A: &str = "agent:a";
pub const AGENT_B: &str = "agent:b";
pub const AGENT_C: &str = "agent:c";

/// Engine plus handles on its in-memory collaborators
pub struct Harness {
    pub engine: DelegationEngine,
    pub store: Arc<InMemoryTokenStore>,
    pub directory: Arc<InMemoryAgentDirectory>,
    pub primary: Arc<InMemoryCacheBackend>,
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

pub async fn harness_with(config: EngineConfig) -> Harness {
    harness_with_store(config, Arc::new(InMemoryTokenStore::new()), None).await
}

/// Build a harness; `store_override` wraps the in-memory store when given
pub async fn harness_with_store(
    config: EngineConfig,
    store: Arc<InMemoryTokenStore>,
    store_override: Option<Arc<dyn TokenStore>>,
) -> Harness {
    let directory = Arc::new(InMemoryAgentDirectory::new());
    directory
        .activate_all([PLATFORM, ROOT_AGENT, AGENT_A, AGENT_B, AGENT_C])
        .await;

    let primary = Arc::new(InMemoryCacheBackend::new());
    let engine_store = store_override.unwrap_or_else(|| store.clone() as Arc<dyn TokenStore>);

    let engine = DelegationEngine::builder()
        .config(config)
        .store(engine_store)
        .directory(directory.clone())
        .primary_cache(primary.clone())
        .build()
        .expect("engine builds");

    Harness {
        engine,
        store,
        directory,
        primary,
    }
}

pub fn in_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

impl Harness {
    pub async fn issue_root(
        &self,
        issuer: &str,
        recipient: &str,
        constraints: Constraints,
    ) -> DelegationNode {
        self.engine
            .create_delegation(IssueRequest::root(issuer, recipient, constraints, in_hours(2)))
            .await
            .expect("root issues")
            .node
    }

    pub async fn issue_child(
        &self,
        parent: &DelegationNode,
        recipient: &str,
        constraints: Constraints,
    ) -> DelegationNode {
        let request = IssueRequest::root(
            parent.recipient_agent_id.clone(),
            recipient,
            constraints,
            in_hours(1),
        )
        .under(parent.id.clone());

        self.engine
            .create_delegation(request)
            .await
            .expect("child issues")
            .node
    }
}

/// A node written straight to the store, bypassing issuance checks
pub fn raw_node(
    id: &str,
    parent: Option<&str>,
    issuer: &str,
    recipient: &str,
    constraints: Constraints,
    expires_at: DateTime<Utc>,
    depth: u32,
) -> DelegationNode {
    NewDelegation {
        id: id.to_string(),
        issuer_agent_id: issuer.to_string(),
        recipient_agent_id: recipient.to_string(),
        constraints,
        issued_at: Utc::now() - Duration::minutes(5),
        expires_at,
        token_hash: format!("token-hash-{}", id),
        link_hash: format!("link-hash-{}", id),
        parent_id: parent.map(str::to_string),
        depth,
    }
    .into_node()
}
