//! Delegation chains: building from the store and shape checks

pub mod builder;

pub use builder::{BuiltChain, ChainBuilder};

use crate::types::DelegationNode;

/// `chain[i].parent_id == chain[i-1].id` for every `i > 0`, and the chain is non-empty
pub fn is_well_linked(chain: &[DelegationNode]) -> bool {
    !chain.is_empty()
        && chain
            .windows(2)
            .all(|pair| pair[1].parent_id.as_deref() == Some(pair[0].id.as_str()))
}
