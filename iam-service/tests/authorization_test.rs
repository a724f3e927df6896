mod common;

use common::TestHarness;
use iam_service::models::{actions, Severity};
use iam_service::services::{AuthzRequest, ServiceError};
use iam_service::store::AuditEventStore;
use serde_json::json;

const PASSWORD: &str = "Val1d-Operator-Pass!";

fn request(harness: &TestHarness) -> AuthzRequest {
    AuthzRequest::new(harness.ctx())
}

#[tokio::test]
async fn test_super_admin_is_unrestricted() {
    let harness = TestHarness::new();
    harness
        .add_identity("root@example.com", PASSWORD, "super_admin")
        .await;
    let actor = harness.login_context("root@example.com", PASSWORD).await;

    // No explicit grants on the role, any operation passes.
    harness
        .core
        .authz
        .authorize(&actor, "orders", "delete", &request(&harness))
        .await
        .expect("super admin should pass without grants");
    harness
        .core
        .authz
        .authorize(
            &actor,
            "identities",
            "delete",
            &request(&harness).with_target_level(2),
        )
        .await
        .expect("super admin outranks every target");
}

#[tokio::test]
async fn test_missing_grant_is_denied() {
    let harness = TestHarness::new();
    harness
        .add_identity("support@example.com", PASSWORD, "support")
        .await;
    let actor = harness.login_context("support@example.com", PASSWORD).await;

    let err = harness
        .core
        .authz
        .authorize(&actor, "products", "update", &request(&harness))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_conditions_gate_the_grant() {
    let harness = TestHarness::new();
    harness
        .add_identity("manager@example.com", PASSWORD, "manager")
        .await;
    let actor = harness.login_context("manager@example.com", PASSWORD).await;

    harness
        .core
        .authz
        .authorize(
            &actor,
            "products",
            "update",
            &request(&harness).with_attributes(json!({"department": "sales"})),
        )
        .await
        .expect("matching condition should allow");

    let err = harness
        .core
        .authz
        .authorize(
            &actor,
            "products",
            "update",
            &request(&harness).with_attributes(json!({"department": "finance"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied { .. }));

    // Missing field fails closed.
    let err = harness
        .core
        .authz
        .authorize(&actor, "products", "update", &request(&harness))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_range_condition_bounds() {
    let harness = TestHarness::new();
    harness
        .add_identity("manager@example.com", PASSWORD, "manager")
        .await;
    let actor = harness.login_context("manager@example.com", PASSWORD).await;

    harness
        .core
        .authz
        .authorize(
            &actor,
            "reports",
            "export",
            &request(&harness).with_attributes(json!({"row_count": 10000})),
        )
        .await
        .expect("upper bound is inclusive");

    let err = harness
        .core
        .authz
        .authorize(
            &actor,
            "reports",
            "export",
            &request(&harness).with_attributes(json!({"row_count": 10001})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_owner_scoped_delete_denied_for_non_owner() {
    let harness = TestHarness::new();
    let owner = harness
        .add_identity("owner@example.com", PASSWORD, "manager")
        .await;
    harness
        .add_identity("peer@example.com", PASSWORD, "manager")
        .await;
    harness.owners.set_owner("orders", "order-1", &owner.id);

    // Same role, same level, different identity: denied.
    let peer = harness.login_context("peer@example.com", PASSWORD).await;
    let err = harness
        .core
        .authz
        .authorize(
            &peer,
            "orders",
            "delete",
            &request(&harness).with_resource_id("order-1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotOwner));

    // The owner passes.
    let owner_ctx = harness.login_context("owner@example.com", PASSWORD).await;
    harness
        .core
        .authz
        .authorize(
            &owner_ctx,
            "orders",
            "delete",
            &request(&harness).with_resource_id("order-1"),
        )
        .await
        .expect("owner should pass the ownership rule");
}

#[tokio::test]
async fn test_ownership_bypass_role_skips_owner_check() {
    let harness = TestHarness::new();
    let owner = harness
        .add_identity("owner@example.com", PASSWORD, "manager")
        .await;
    harness
        .add_identity("admin@example.com", PASSWORD, "admin")
        .await;
    harness.owners.set_owner("orders", "order-1", &owner.id);

    let admin = harness.login_context("admin@example.com", PASSWORD).await;
    harness
        .core
        .authz
        .authorize(
            &admin,
            "orders",
            "delete",
            &request(&harness).with_resource_id("order-1"),
        )
        .await
        .expect("bypass-ownership role should pass");
}

#[tokio::test]
async fn test_unresolvable_owner_fails_closed() {
    let harness = TestHarness::new();
    harness
        .add_identity("manager@example.com", PASSWORD, "manager")
        .await;
    let actor = harness.login_context("manager@example.com", PASSWORD).await;

    // No registered owner for the target.
    let err = harness
        .core
        .authz
        .authorize(
            &actor,
            "orders",
            "delete",
            &request(&harness).with_resource_id("order-unknown"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotOwner));
}

#[tokio::test]
async fn test_hierarchy_denies_equal_and_higher_targets() {
    let harness = TestHarness::new();
    harness
        .add_identity("manager@example.com", PASSWORD, "manager")
        .await;
    let actor = harness.login_context("manager@example.com", PASSWORD).await;

    // Equal level: denied even though the grant allows the action.
    let err = harness
        .core
        .authz
        .authorize(
            &actor,
            "identities",
            "update",
            &request(&harness).with_target_level(2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::HierarchyViolation));

    // More privileged target: denied.
    let err = harness
        .core
        .authz
        .authorize(
            &actor,
            "identities",
            "update",
            &request(&harness).with_target_level(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::HierarchyViolation));

    // Strictly subordinate target: allowed.
    harness
        .core
        .authz
        .authorize(
            &actor,
            "identities",
            "update",
            &request(&harness).with_target_level(4),
        )
        .await
        .expect("subordinate target should pass");
}

#[tokio::test]
async fn test_subordinate_creation_requires_role_flag() {
    let harness = TestHarness::new();
    harness
        .add_identity("admin@example.com", PASSWORD, "admin")
        .await;
    let admin = harness.login_context("admin@example.com", PASSWORD).await;

    harness
        .core
        .authz
        .authorize(
            &admin,
            "identities",
            "create",
            &request(&harness).with_target_level(4),
        )
        .await
        .expect("admin may create subordinates");
}

#[tokio::test]
async fn test_bulk_limits_are_two_tiered() {
    let harness = TestHarness::new();
    harness
        .add_identity("support@example.com", PASSWORD, "support")
        .await;
    harness
        .add_identity("manager@example.com", PASSWORD, "manager")
        .await;
    harness
        .add_identity("root@example.com", PASSWORD, "super_admin")
        .await;

    let support = harness.login_context("support@example.com", PASSWORD).await;
    let manager = harness.login_context("manager@example.com", PASSWORD).await;
    let root = harness.login_context("root@example.com", PASSWORD).await;
    let ctx = harness.ctx();

    // At the standard limit everyone passes.
    harness
        .core
        .authz
        .check_bulk_size(&support, 100, &ctx)
        .await
        .expect("standard limit is inclusive");

    // One above it a regular role is denied.
    let err = harness
        .core
        .authz
        .check_bulk_size(&support, 101, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::BulkLimitExceeded { limit: 100 }
    ));

    // Admin-or-above may exceed the standard tier.
    harness
        .core
        .authz
        .check_bulk_size(&manager, 101, &ctx)
        .await
        .expect("admin floor passes the standard tier");

    // Above the elevated tier only the most privileged level passes.
    let err = harness
        .core
        .authz
        .check_bulk_size(&manager, 1001, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::BulkLimitExceeded { limit: 1000 }
    ));
    harness
        .core
        .authz
        .check_bulk_size(&root, 1001, &ctx)
        .await
        .expect("super admin passes the elevated tier");
}

#[tokio::test]
async fn test_denials_are_audited_with_expected_severity() {
    let harness = TestHarness::new();
    harness
        .add_identity("support@example.com", PASSWORD, "support")
        .await;
    let actor = harness.login_context("support@example.com", PASSWORD).await;

    harness
        .add_identity("manager@example.com", PASSWORD, "manager")
        .await;
    let manager = harness.login_context("manager@example.com", PASSWORD).await;

    let _ = harness
        .core
        .authz
        .authorize(&actor, "products", "update", &request(&harness))
        .await;
    let _ = harness
        .core
        .authz
        .authorize(
            &manager,
            "identities",
            "update",
            &request(&harness).with_target_level(1),
        )
        .await;

    harness.core.audit.flush().await;
    let events = harness
        .audit_store
        .events_since(chrono::Utc::now() - chrono::Duration::minutes(5))
        .await
        .unwrap();

    let denied: Vec<_> = events
        .iter()
        .filter(|e| e.action == actions::PERMISSION_DENIED)
        .collect();
    assert_eq!(denied.len(), 1);
    assert!(denied.iter().all(|e| e.severity == Severity::Medium));

    let violations: Vec<_> = events
        .iter()
        .filter(|e| e.action == actions::HIERARCHY_VIOLATION)
        .collect();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
}
