//! Error types for the delegation engine

use crate::types::ChainIssue;
use thiserror::Error;

/// Delegation engine errors
///
/// Semantic verification failures (revoked, expired, depth exceeded, ...)
/// are reported as [`ChainIssue`] values inside a verification result.
/// This enum is raised for issuance refusals and infrastructure failures.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// Delegation not found
    #[error("Delegation not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parent chain failed verification, nothing was written
    #[error("Parent chain {parent_id} is invalid: {}", summarize(.issues))]
    ParentChainInvalid {
        parent_id: String,
        issues: Vec<ChainIssue>,
    },

    /// Parent pointers loop or exceed the hop bound
    #[error("Parent chain of {leaf_id} is corrupt after {hops} hops")]
    ParentChainCorrupt { leaf_id: String, hops: usize },

    /// Delegation depth limit exceeded
    #[error("Delegation depth {depth} exceeds limit {max}")]
    DepthExceeded { depth: u32, max: u32 },

    /// Token store error
    #[error("Store error: {0}")]
    Store(String),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Signing or token verification error
    #[error("Signing error: {0}")]
    Signing(String),

    /// Operation deadline elapsed
    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DelegationError {
    /// True for failures of the store, cache or deadline rather than of
    /// the delegation data itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            DelegationError::Store(_)
                | DelegationError::Cache(_)
                | DelegationError::DeadlineExceeded(_)
                | DelegationError::Internal(_)
        )
    }
}

fn summarize(issues: &[ChainIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for delegation operations
pub type Result<T> = std::result::Result<T, DelegationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueCode;

    #[test]
    fn test_parent_chain_invalid_lists_issues() {
        let err = DelegationError::ParentChainInvalid {
            parent_id: "d-1".to_string(),
            issues: vec![
                ChainIssue::new(IssueCode::Expired, "d-0", "delegation expired"),
                ChainIssue::new(IssueCode::Revoked, "d-1", "delegation revoked"),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("d-1"));
        assert!(message.contains("EXPIRED"));
        assert!(message.contains("REVOKED"));
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(DelegationError::Store("down".into()).is_infrastructure());
        assert!(DelegationError::DeadlineExceeded("build_chain".into()).is_infrastructure());
        assert!(!DelegationError::NotFound("x".into()).is_infrastructure());
    }
}
