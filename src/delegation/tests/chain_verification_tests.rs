//! Chain verification tests
//!
//! Build → per-node checks → narrowing → proof, through the engine facade.

mod common;

use chrono::{Duration, Utc};
use common::*;
use cretoai_delegation::{chain::is_well_linked, AgentStatus, Constraints, IssueCode};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn perms(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// NARROWING THROUGH A CHAIN
// ============================================================================

#[tokio::test]
async fn test_amount_and_permissions_narrow_down_chain() {
    let h = harness().await;

    let r = h
        .issue_root(
            PLATFORM,
            ROOT_AGENT,
            Constraints::with_permissions(["pay", "refund"]).max_amount(1000),
        )
        .await;
    let a = h
        .issue_child(&r, AGENT_A, Constraints::with_permissions(["pay"]).max_amount(500))
        .await;
    let b = h
        .issue_child(
            &a,
            AGENT_B,
            Constraints::with_permissions(["pay", "refund"]).max_amount(800),
        )
        .await;

    let result = h.engine.verify_chain(&b.id).await.unwrap();

    assert!(result.valid, "errors: {:?}", result.errors);
    assert_eq!(result.chain.len(), 3);
    assert!(is_well_linked(&result.chain));
    assert_eq!(result.effective_constraints.max_amount, Some(500));
    assert_eq!(result.effective_permissions, perms(&["pay"]));
}

#[tokio::test]
async fn test_explicit_empty_permissions_zero_out_descendants() {
    let h = harness().await;

    let r = h
        .issue_root(PLATFORM, ROOT_AGENT, Constraints::with_permissions(["pay", "refund"]))
        .await;
    let a = h.issue_child(&r, AGENT_A, Constraints::default()).await;
    let b = h
        .issue_child(&a, AGENT_B, Constraints::with_permissions(["pay", "refund", "admin"]))
        .await;
    let c = h
        .issue_child(&b, AGENT_C, Constraints::with_permissions(["pay"]))
        .await;

    for leaf in [&a, &b, &c] {
        let result = h.engine.verify_chain(&leaf.id).await.unwrap();
        assert!(result.valid);
        assert!(
            result.effective_permissions.is_empty(),
            "{} should have no permissions",
            leaf.id
        );
    }

    // Siblings outside the empty link keep theirs
    let sibling = h
        .issue_child(&r, AGENT_B, Constraints::with_permissions(["refund"]))
        .await;
    let result = h.engine.verify_chain(&sibling.id).await.unwrap();
    assert_eq!(result.effective_permissions, perms(&["refund"]));
}

#[tokio::test]
async fn test_merchant_and_category_narrowing() {
    let h = harness().await;

    let r = h
        .issue_root(
            PLATFORM,
            ROOT_AGENT,
            Constraints::with_permissions(["pay"])
                .allowed_merchants(["m1", "m2", "m3"])
                .blocked_categories(["gambling"]),
        )
        .await;
    let a = h
        .issue_child(&r, AGENT_A, Constraints::with_permissions(["pay"]))
        .await;
    let b = h
        .issue_child(
            &a,
            AGENT_B,
            Constraints::with_permissions(["pay"])
                .allowed_merchants(["m2", "m9"])
                .blocked_categories(["crypto"])
                .require_reason(true),
        )
        .await;

    let result = h.engine.verify_chain(&b.id).await.unwrap();
    let effective = result.effective_constraints;

    assert_eq!(effective.allowed_merchants, Some(perms(&["m2"])));
    assert_eq!(effective.blocked_categories, Some(perms(&["crypto", "gambling"])));
    assert_eq!(effective.allowed_categories, None);
    assert!(effective.require_reason);
}

// ============================================================================
// PER-NODE CHECKS
// ============================================================================

#[tokio::test]
async fn test_missing_leaf_not_found() {
    let h = harness().await;

    let result = h.engine.verify_chain("does-not-exist").await.unwrap();

    assert!(!result.valid);
    assert!(result.has_error(IssueCode::NotFound));
    assert!(result.chain.is_empty());
    assert!(result.verification_proof.is_none());
}

#[tokio::test]
async fn test_expired_middle_node_invalidates_chain() {
    let h = harness().await;
    let perms_all = Constraints::with_permissions(["pay"]);

    h.store
        .insert_node(raw_node("r", None, PLATFORM, ROOT_AGENT, perms_all.clone(), in_hours(2), 1))
        .await;
    h.store
        .insert_node(raw_node(
            "a",
            Some("r"),
            ROOT_AGENT,
            AGENT_A,
            perms_all.clone(),
            Utc::now() - Duration::minutes(1),
            2,
        ))
        .await;
    h.store
        .insert_node(raw_node("b", Some("a"), AGENT_A, AGENT_B, perms_all, in_hours(1), 3))
        .await;

    let result = h.engine.verify_chain("b").await.unwrap();

    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, IssueCode::Expired);
    assert_eq!(result.errors[0].delegation_id, "a");
    assert!(result.verification_proof.is_none());

    // Diagnostics are still computed
    assert_eq!(result.effective_permissions, perms(&["pay"]));
}

#[tokio::test]
async fn test_depth_limit_of_parent() {
    let h = harness().await;

    h.store
        .insert_node(raw_node(
            "r",
            None,
            PLATFORM,
            ROOT_AGENT,
            Constraints::with_permissions(["pay"]).max_delegation_depth(1),
            in_hours(2),
            1,
        ))
        .await;
    h.store
        .insert_node(raw_node(
            "a",
            Some("r"),
            ROOT_AGENT,
            AGENT_A,
            Constraints::with_permissions(["pay"]),
            in_hours(1),
            2,
        ))
        .await;

    let result = h.engine.verify_chain("a").await.unwrap();

    assert!(!result.valid);
    assert!(result.has_error(IssueCode::DepthExceeded));
}

#[tokio::test]
async fn test_issuer_inactive_is_error_recipient_inactive_is_warning() {
    let h = harness().await;

    let r = h
        .issue_root(PLATFORM, ROOT_AGENT, Constraints::with_permissions(["pay"]))
        .await;
    let a = h
        .issue_child(&r, AGENT_A, Constraints::with_permissions(["pay"]))
        .await;

    // Recipient of the leaf goes away: still valid
    h.directory.upsert(AGENT_A, AgentStatus::Suspended).await;
    h.engine.invalidate_cache().await;
    h.primary.set_available(false);

    let result = h.engine.verify_chain(&a.id).await.unwrap();
    assert!(result.valid, "errors: {:?}", result.errors);
    assert!(result.has_warning(IssueCode::RecipientInactive));

    // Issuer of the leaf goes away: invalid
    h.directory.upsert(ROOT_AGENT, AgentStatus::Deactivated).await;
    h.engine.invalidate_cache().await;

    let result = h.engine.verify_chain(&a.id).await.unwrap();
    assert!(!result.valid);
    assert!(result.has_error(IssueCode::IssuerInactive));
}

#[tokio::test]
async fn test_unknown_issuer_is_error() {
    let h = harness().await;

    h.store
        .insert_node(raw_node(
            "r",
            None,
            "agent:ghost",
            ROOT_AGENT,
            Constraints::with_permissions(["pay"]),
            in_hours(1),
            1,
        ))
        .await;

    let result = h.engine.verify_chain("r").await.unwrap();
    assert!(result.has_error(IssueCode::IssuerInactive));
}

#[tokio::test]
async fn test_child_outliving_parent_is_warning() {
    let h = harness().await;

    h.store
        .insert_node(raw_node("r", None, PLATFORM, ROOT_AGENT, Constraints::with_permissions(["pay"]), in_hours(1), 1))
        .await;
    h.store
        .insert_node(raw_node("a", Some("r"), ROOT_AGENT, AGENT_A, Constraints::with_permissions(["pay"]), in_hours(5), 2))
        .await;

    let result = h.engine.verify_chain("a").await.unwrap();

    assert!(result.valid);
    assert!(result.has_warning(IssueCode::ExpiryExceedsParent));
}

#[tokio::test]
async fn test_currency_mismatch_is_warning() {
    let h = harness().await;

    let r = h
        .issue_root(PLATFORM, ROOT_AGENT, Constraints::with_permissions(["pay"]).currency("USD"))
        .await;
    let a = h
        .issue_child(&r, AGENT_A, Constraints::with_permissions(["pay"]).currency("EUR"))
        .await;

    let result = h.engine.verify_chain(&a.id).await.unwrap();

    assert!(result.valid);
    assert!(result.has_warning(IssueCode::CurrencyMismatch));
    assert_eq!(result.effective_constraints.currency.as_deref(), Some("USD"));
}

// ============================================================================
// CORRUPT AND PARTIAL DATA
// ============================================================================

#[tokio::test]
async fn test_truncated_chain_is_suspicious() {
    let h = harness().await;

    h.store
        .insert_node(raw_node(
            "a",
            Some("vanished"),
            ROOT_AGENT,
            AGENT_A,
            Constraints::with_permissions(["pay"]),
            in_hours(1),
            2,
        ))
        .await;

    let result = h.engine.verify_chain("a").await.unwrap();

    assert!(!result.valid);
    assert!(result.has_error(IssueCode::ChainTruncated));
    assert_eq!(result.chain.len(), 1);
}

#[tokio::test]
async fn test_cyclic_parents_return_invalid_result() {
    let h = harness().await;
    let c = Constraints::with_permissions(["pay"]);

    h.store
        .insert_node(raw_node("x", Some("y"), AGENT_A, AGENT_B, c.clone(), in_hours(1), 2))
        .await;
    h.store
        .insert_node(raw_node("y", Some("x"), AGENT_B, AGENT_A, c, in_hours(1), 2))
        .await;

    let result = h.engine.verify_chain("x").await.unwrap();

    assert!(!result.valid);
    assert!(result.has_error(IssueCode::ParentChainCorrupt));
}

// ============================================================================
// IDEMPOTENCE AND PROOFS
// ============================================================================

#[tokio::test]
async fn test_repeat_verification_is_stable() {
    let h = harness().await;

    let r = h
        .issue_root(
            PLATFORM,
            ROOT_AGENT,
            Constraints::with_permissions(["pay", "refund"])
                .max_amount(1000)
                .time_window(8, 20),
        )
        .await;
    let a = h
        .issue_child(&r, AGENT_A, Constraints::with_permissions(["pay"]).max_usage_count(5))
        .await;

    let first = h.engine.verify_chain(&a.id).await.unwrap();
    let second = h.engine.verify_chain(&a.id).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.valid, second.valid);
    assert_eq!(first.errors, second.errors);
    assert_eq!(first.effective_permissions, second.effective_permissions);
    assert_eq!(first.effective_constraints, second.effective_constraints);
}

#[tokio::test]
async fn test_valid_chain_carries_verifiable_proof() {
    let h = harness().await;

    let r = h
        .issue_root(PLATFORM, ROOT_AGENT, Constraints::with_permissions(["pay"]))
        .await;
    let a = h
        .issue_child(&r, AGENT_A, Constraints::with_permissions(["pay"]))
        .await;

    let result = h.engine.verify_chain(&a.id).await.unwrap();
    let proof = result.verification_proof.expect("valid chain has a proof");

    assert_eq!(proof.claims.chain_length, 2);
    assert_eq!(proof.claims.root_id, r.id);
    assert_eq!(proof.claims.leaf_id, a.id);
    assert_eq!(proof.claims.effective_permissions, perms(&["pay"]));
    assert_ne!(proof.claims.path_digest, a.link_hash);
    assert!(proof.expires_at <= Utc::now() + Duration::hours(1));

    let claims = h.engine.verify_proof(&proof.token).unwrap();
    assert_eq!(claims, proof.claims);
    assert!(h.engine.verify_proof("garbage").is_err());
}

// ============================================================================
// PROPERTY-BASED TESTS (PROPTEST)
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_issued_chain_never_widens(
        amounts in proptest::collection::vec(1u64..10_000, 1..5),
        grants in proptest::collection::vec(
            proptest::sample::subsequence(vec!["pay", "refund", "void"], 0..=3),
            1..5,
        ),
    ) {
        tokio_test::block_on(async {
            let h = harness().await;
            let agents = [ROOT_AGENT, AGENT_A, AGENT_B, AGENT_C];
            let links = amounts.len().min(grants.len()).min(agents.len());

            let mut leaf = h
                .issue_root(
                    PLATFORM,
                    agents[0],
                    Constraints::with_permissions(grants[0].clone()).max_amount(amounts[0]),
                )
                .await;
            for i in 1..links {
                leaf = h
                    .issue_child(
                        &leaf,
                        agents[i],
                        Constraints::with_permissions(grants[i].clone()).max_amount(amounts[i]),
                    )
                    .await;
            }

            let result = h.engine.verify_chain(&leaf.id).await.unwrap();
            assert!(result.valid);
            assert_eq!(result.chain.len(), links);
            assert!(is_well_linked(&result.chain));
            for (i, node) in result.chain.iter().enumerate() {
                assert_eq!(node.depth as usize, i + 1);
            }

            let min_amount = amounts[..links].iter().copied().min();
            assert_eq!(result.effective_constraints.max_amount, min_amount);

            for permission in &result.effective_permissions {
                assert!(grants[..links].iter().all(|g| g.contains(&permission.as_str())));
            }
        });
    }
}
