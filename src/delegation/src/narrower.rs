//! Narrowing of constraints and permissions along a chain
//!
//! Pure functions, no I/O. Rules per field:
//!
//! | field                         | rule                                      |
//! |-------------------------------|-------------------------------------------|
//! | `max_amount`, `max_usage_count`, `max_delegation_depth` | minimum of defined values |
//! | `allowed_*`                   | intersection of defined sets, unset if none |
//! | `blocked_*`                   | union of defined sets                     |
//! | `time_window`                 | latest start, earliest end                |
//! | `require_reason`              | true if any link requires it              |
//! | `currency`                    | root-most defined value                   |
//! | permissions                   | intersection of every link, no exceptions |
//!
//! Permissions are strict: a link with an empty permission set empties the
//! effective permissions of the whole chain. There is no "unset means
//! unrestricted" reading for them, unlike merchants and categories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{DelegationId, DelegationNode, TimeWindow};

/// The bound actually enforced at the leaf of a chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConstraints {
    pub max_amount: Option<u64>,
    pub currency: Option<String>,
    pub allowed_merchants: Option<BTreeSet<String>>,
    pub blocked_merchants: Option<BTreeSet<String>>,
    pub allowed_categories: Option<BTreeSet<String>>,
    pub blocked_categories: Option<BTreeSet<String>>,
    pub max_usage_count: Option<u64>,
    pub time_window: Option<TimeWindow>,
    pub require_reason: bool,
    pub max_delegation_depth: Option<u32>,
}

/// Effective permissions plus constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrowedGrant {
    pub permissions: BTreeSet<String>,
    pub constraints: EffectiveConstraints,
}

/// A link naming a different currency than the chain's effective one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyConflict {
    pub delegation_id: DelegationId,
    pub expected: String,
    pub found: String,
}

/// Narrow permissions and constraints across `chain` (root first)
pub fn narrow(chain: &[DelegationNode]) -> NarrowedGrant {
    NarrowedGrant {
        permissions: effective_permissions(chain),
        constraints: effective_constraints(chain),
    }
}

/// Intersection of every link's permission set
pub fn effective_permissions(chain: &[DelegationNode]) -> BTreeSet<String> {
    let mut links = chain.iter().map(|n| &n.constraints.permissions);

    let Some(first) = links.next() else {
        return BTreeSet::new();
    };

    links.fold(first.clone(), |acc, perms| {
        acc.intersection(perms).cloned().collect()
    })
}

/// Narrow every constraint field across `chain`
pub fn effective_constraints(chain: &[DelegationNode]) -> EffectiveConstraints {
    let mut effective = EffectiveConstraints::default();

    for node in chain {
        let c = &node.constraints;

        effective.max_amount = min_defined(effective.max_amount, c.max_amount);
        effective.max_usage_count = min_defined(effective.max_usage_count, c.max_usage_count);
        effective.max_delegation_depth =
            min_defined(effective.max_delegation_depth, c.max_delegation_depth);

        if effective.currency.is_none() {
            effective.currency = c.currency.clone();
        }

        intersect_defined(&mut effective.allowed_merchants, c.allowed_merchants.as_ref());
        intersect_defined(&mut effective.allowed_categories, c.allowed_categories.as_ref());
        union_defined(&mut effective.blocked_merchants, c.blocked_merchants.as_ref());
        union_defined(&mut effective.blocked_categories, c.blocked_categories.as_ref());

        effective.time_window = match (effective.time_window, c.time_window) {
            (Some(acc), Some(window)) => Some(acc.intersect(&window)),
            (acc, window) => acc.or(window),
        };

        if c.require_reason == Some(true) {
            effective.require_reason = true;
        }
    }

    effective
}

/// Links whose currency differs from the root-most defined one
pub fn currency_conflicts(chain: &[DelegationNode]) -> Vec<CurrencyConflict> {
    let mut expected: Option<&str> = None;
    let mut conflicts = Vec::new();

    for node in chain {
        let Some(currency) = node.constraints.currency.as_deref() else {
            continue;
        };

        match expected {
            None => expected = Some(currency),
            Some(exp) if !exp.eq_ignore_ascii_case(currency) => {
                conflicts.push(CurrencyConflict {
                    delegation_id: node.id.clone(),
                    expected: exp.to_string(),
                    found: currency.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    conflicts
}

fn min_defined<T: Ord + Copy>(acc: Option<T>, value: Option<T>) -> Option<T> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.min(v)),
        (a, v) => a.or(v),
    }
}

fn intersect_defined(acc: &mut Option<BTreeSet<String>>, value: Option<&BTreeSet<String>>) {
    let Some(value) = value else {
        return;
    };

    *acc = Some(match acc.take() {
        Some(current) => current.intersection(value).cloned().collect(),
        None => value.clone(),
    });
}

fn union_defined(acc: &mut Option<BTreeSet<String>>, value: Option<&BTreeSet<String>>) {
    let Some(value) = value else {
        return;
    };

    acc.get_or_insert_with(BTreeSet::new).extend(value.iter().cloned());
}
