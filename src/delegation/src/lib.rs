//! # CretoAI Delegation Engine
//!
//! Verifiable delegation chains for autonomous agents. An agent may hand a
//! bounded slice of its spending or acting authority to another agent; every
//! such grant must stay within the grant of its issuer, all the way to the root.
//!
//! ## Features
//!
//! - **Chain building** from parent links, with a hop bound and cycle guard
//! - **Verification** of status, expiry, depth limits and agent liveness
//! - **Constraint narrowing** of amounts, merchants, categories, windows and permissions
//! - **Cascading revocation** of a delegation subtree, safe to retry
//! - **Signed proofs** of verified chains with a bounded validity window
//! - **Two-tier chain cache** (shared primary + local fallback)
//!
//! ## Example
//!
//! ```rust
//! use cretoai_delegation::{Constraints, DelegationEngine, InMemoryAgentDirectory, IssueRequest};
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryAgentDirectory::new());
//!     directory.activate_all(["agent:treasury", "agent:shopper"]).await;
//!
//!     let engine = DelegationEngine::builder().directory(directory).build()?;
//!
//!     let issued = engine
//!         .create_delegation(IssueRequest::root(
//!             "agent:treasury",
//!             "agent:shopper",
//!             Constraints::with_permissions(["pay"]).max_amount(500),
//!             Utc::now() + Duration::hours(1),
//!         ))
//!         .await?;
//!
//!     let result = engine.verify_chain(&issued.node.id).await?;
//!     assert!(result.valid);
//!     assert_eq!(result.effective_constraints.max_amount, Some(500));
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod narrower;
pub mod proof;
pub mod revocation;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod verifier;

// Re-export commonly used types
pub use types::{
    AgentId, AgentRecord, AgentStatus, ChainIssue, Constraints, DelegationId, DelegationNode,
    DelegationStatus, IssueCode, NewDelegation, RevocationMetadata, TimeWindow,
};
pub use cache::{CacheBackend, CacheStats, ChainCache, InMemoryCacheBackend};
pub use chain::{BuiltChain, ChainBuilder};
pub use config::{CacheConfig, EngineConfig};
pub use crypto::{Blake3Hasher, Ed25519Signer, Hasher, Signer};
pub use deadline::Deadline;
pub use engine::{DelegationEngine, DelegationEngineBuilder};
pub use error::{DelegationError, Result};
pub use issuer::{DelegationIssuer, IssueRequest, IssuedDelegation};
pub use narrower::{EffectiveConstraints, NarrowedGrant};
pub use proof::{ProofClaims, ProofGenerator, VerificationProof};
pub use revocation::{RevocationFailure, RevocationPropagator, RevocationReport};
pub use store::{AgentDirectory, InMemoryAgentDirectory, InMemoryTokenStore, TokenStore};
pub use verifier::{ChainVerificationResult, ChainVerifier};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
