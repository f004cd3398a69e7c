//! End-to-end tests through `AuthzService`
//!
//! Department admin delegation, role editing, token versioning and the
//! permission checker working against one shared evaluator.

mod common;

use apigov_authz::{
    AuthzError, CreateRole, DecisionReason, DeptScope, ErrorKind, Permission, PolicyFilter,
    PolicyStore,
};
use apigov_core::{Department, DepartmentCatalog};
use common::harness;

// ============================================================================
// SYSTEM ADMIN
// ============================================================================

#[tokio::test]
async fn test_system_admin_can_call_anything() {
    let h = harness().await;
    h.user(1, "root", 7).await;

    h.service.init_system_admin(1).await.unwrap();

    let check = h
        .service
        .check_permission(1, "/api/v1/anything", "DELETE")
        .await
        .unwrap();
    assert!(check.allowed);
    assert!(check.is_admin);
    assert_eq!(check.reason, DecisionReason::PolicyMatch { role: "admin".to_string() });

    // Users without a department still get through on the `*` rule
    h.user(2, "ops-bot", 0).await;
    h.service.init_system_admin(2).await.unwrap();
    assert!(h.allowed(2, "/api/v1/user/list", "PUT").await);
}

#[tokio::test]
async fn test_init_system_admin_is_idempotent() {
    let h = harness().await;
    h.user(1, "root", 7).await;

    h.service.init_system_admin(1).await.unwrap();
    let after_first = h.store.count_all().await.unwrap();
    h.service.init_system_admin(1).await.unwrap();

    assert_eq!(h.store.count_all().await.unwrap(), after_first);
    assert_eq!(after_first, 2); // binding + universal rule
}

#[tokio::test]
async fn test_init_system_admin_unknown_user() {
    let h = harness().await;
    let err = h.service.init_system_admin(99).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// DEPARTMENT FAST PATH
// ============================================================================

#[tokio::test]
async fn test_department_fast_path() {
    let h = harness().await;
    h.user(1, "alice", 7).await;

    let check = h
        .service
        .check_permission(1, "/api/v1/business/list", "GET")
        .await
        .unwrap();
    assert!(check.allowed);
    assert_eq!(check.reason, DecisionReason::DepartmentFastPath);
    assert_eq!(check.department_id, 7);

    assert!(h.allowed(1, "/api/v1/dashboard/stats", "GET").await);
    assert!(!h.allowed(1, "/api/v1/user/list", "GET").await);
    assert!(!h.allowed(1, "/api/v1/api/category", "GET").await);
}

// ============================================================================
// DEPARTMENT ADMIN DELEGATION
// ============================================================================

#[tokio::test]
async fn test_grant_rejects_foreign_department() {
    let h = harness().await;
    h.user(42, "carol", 3).await;

    let err = h.service.grant_dept_admin(42, 7).await.unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(_)));
    assert!(err.to_string().contains("does not belong to department"));

    // Nothing was written
    assert_eq!(h.store.count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_grant_requires_existing_user_and_department() {
    let h = harness().await;
    h.user(42, "carol", 7).await;

    assert_eq!(h.service.grant_dept_admin(404, 7).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(h.service.grant_dept_admin(42, 404).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_grant_and_revoke_dept_admin() {
    let h = harness().await;
    h.user(42, "carol", 7).await;

    h.service.grant_dept_admin(42, 7).await.unwrap();

    assert!(h.allowed(42, "/api/v1/dept/7/users", "GET").await);
    assert!(h.allowed(42, "/api/v1/dept/7/users/12", "DELETE").await);
    assert!(h.allowed(42, "/api/v1/dept/7/roles", "POST").await);
    assert!(!h.allowed(42, "/api/v1/dept/7/roles", "DELETE").await);
    assert!(!h.allowed(42, "/api/v1/dept/3/users", "GET").await);

    assert!(h.service.check_dept_permission(42, 7, "GET").await.unwrap());
    assert!(!h.service.check_dept_permission(42, 3, "GET").await.unwrap());

    let admins = h.service.dept_admins(7).await.unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].id, 42);

    // 16 rules + 1 binding, and a second grant adds nothing
    assert_eq!(h.store.count_all().await.unwrap(), 17);
    h.service.grant_dept_admin(42, 7).await.unwrap();
    assert_eq!(h.store.count_all().await.unwrap(), 17);

    h.service.revoke_dept_admin(42, 7).await.unwrap();
    assert!(!h.allowed(42, "/api/v1/dept/7/users", "GET").await);
    assert!(!h.service.check_dept_permission(42, 7, "GET").await.unwrap());
    assert!(h.service.dept_admins(7).await.unwrap().is_empty());

    // The role keeps its rules
    let rules = h
        .store
        .scan(&PolicyFilter::permissions().subject("dept_admin_7"))
        .await
        .unwrap();
    assert_eq!(rules.len(), 16);
}

#[tokio::test]
async fn test_check_dept_permission_through_wildcard_rule() {
    let h = harness().await;
    h.user(5, "dave", 7).await;
    h.role_for(5, "Auditor", "eng_auditor", 7).await;

    h.service
        .evaluator()
        .add_permission("eng_auditor", "/api/v1/dept/7/*", "GET", DeptScope::Dept(7))
        .await
        .unwrap();
    h.service.reload_policy().await.unwrap();

    assert!(h.service.check_dept_permission(5, 7, "GET").await.unwrap());
    assert!(!h.service.check_dept_permission(5, 7, "DELETE").await.unwrap());
    assert!(!h.service.check_dept_permission(5, 3, "GET").await.unwrap());
}

#[tokio::test]
async fn test_system_admin_passes_dept_permission() {
    let h = harness().await;
    h.user(1, "root", 7).await;
    h.service.init_system_admin(1).await.unwrap();

    assert!(h.service.check_dept_permission(1, 3, "DELETE").await.unwrap());
}

#[tokio::test]
async fn test_department_scope_does_not_inherit() {
    let h = harness().await;
    h.directory
        .create_department(Department::new(8, "Platform", "plat").with_parent(7, 2))
        .await
        .unwrap();
    h.user(1, "erin", 8).await;
    h.role_for(1, "Reader", "reader", 8).await;

    h.service
        .evaluator()
        .add_permission("reader", "/api/v1/reports", "GET", DeptScope::Dept(7))
        .await
        .unwrap();
    h.service.reload_policy().await.unwrap();

    assert!(!h.allowed(1, "/api/v1/reports", "GET").await);
}

// ============================================================================
// ROLE CREATION
// ============================================================================

fn create_role(name: &str, code: &str, dept_id: u64) -> CreateRole {
    CreateRole {
        name: name.to_string(),
        code: code.to_string(),
        description: String::new(),
        dept_id,
        current_user_id: None,
    }
}

#[tokio::test]
async fn test_role_codes_are_department_prefixed() {
    let h = harness().await;

    let eng = h.service.create_role(create_role("Lead", "lead", 7)).await.unwrap();
    let ops = h.service.create_role(create_role("Lead", "lead", 3)).await.unwrap();

    assert_eq!(eng.code, "eng_lead");
    assert_eq!(ops.code, "ops_lead");
    assert_eq!(eng.dept_id, 7);
}

#[tokio::test]
async fn test_role_creation_conflicts() {
    let h = harness().await;
    h.service.create_role(create_role("Lead", "lead", 7)).await.unwrap();

    let same_name = h.service.create_role(create_role("Lead", "other", 7)).await.unwrap_err();
    assert!(matches!(same_name, AuthzError::Conflict(_)));

    let same_code = h.service.create_role(create_role("Chief", "lead", 7)).await.unwrap_err();
    assert!(matches!(same_code, AuthzError::Conflict(_)));

    let missing_dept = h.service.create_role(create_role("Lead", "lead", 99)).await.unwrap_err();
    assert_eq!(missing_dept.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_role_creation_restricted_to_own_department() {
    let h = harness().await;
    h.user(5, "frank", 3).await;
    h.user(6, "root", 3).await;
    h.role_for(6, "Administrator", "admin", 0).await;

    let mut request = create_role("Lead", "lead", 7);
    request.current_user_id = Some(5);
    let err = h.service.create_role(request.clone()).await.unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(_)));

    request.current_user_id = Some(6);
    assert!(h.service.create_role(request).await.is_ok());
}

#[tokio::test]
async fn test_new_role_gets_default_bundle() {
    let h = harness().await;
    h.user(1, "gina", 7).await;
    let role = h.service.create_role(create_role("Lead", "lead", 7)).await.unwrap();
    h.directory_assign(1, role.id).await;

    assert!(h.allowed(1, "/api/v1/user/list", "GET").await);
    assert!(h.allowed(1, "/api/v1/role/5", "PUT").await);
    assert!(h.allowed(1, "/api/v1/departments/7", "GET").await);
    assert!(!h.allowed(1, "/api/v1/departments/7", "POST").await);

    let permissions = h.service.role_permissions(role.id).await.unwrap();
    assert_eq!(permissions.len(), 10);
}

// ============================================================================
// ROLE PERMISSION EDITING
// ============================================================================

#[tokio::test]
async fn test_selective_replace_keeps_baseline() {
    let h = harness().await;
    h.user(1, "hank", 7).await;
    let role = h.service.create_role(create_role("Lead", "lead", 7)).await.unwrap();
    h.directory_assign(1, role.id).await;

    h.service
        .update_role_permissions(role.id, &[Permission::new("/api/v1/orders", "GET")])
        .await
        .unwrap();
    assert!(h.allowed(1, "/api/v1/orders", "GET").await);

    h.service
        .update_role_permissions(role.id, &[Permission::new("/api/v1/invoices/*", "GET")])
        .await
        .unwrap();

    assert!(h.allowed(1, "/api/v1/user/list", "GET").await);
    assert!(h.allowed(1, "/api/v1/invoices/2024", "GET").await);
    assert!(!h.allowed(1, "/api/v1/orders", "GET").await);
}

#[tokio::test]
async fn test_update_by_api_ids_skips_unknown() {
    let h = harness().await;
    h.user(1, "ivy", 7).await;
    let role = h.role_for(1, "Viewer", "eng_viewer", 7).await;
    let orders = h.api(501, "/api/v1/orders", "GET").await;
    let refunds = h.api(502, "/api/v1/refunds", "POST").await;

    h.service
        .update_role_permissions_by_api_ids(role.id, &[orders.id, 9999, refunds.id], Some(7))
        .await
        .unwrap();

    assert!(h.allowed(1, "/api/v1/orders", "GET").await);
    assert!(h.allowed(1, "/api/v1/refunds", "POST").await);

    let mut ids = h.service.role_api_ids(role.id).await.unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![501, 502]);

    let stored = h
        .store
        .scan(&PolicyFilter::permissions().subject("eng_viewer"))
        .await
        .unwrap();
    assert!(stored.iter().all(|r| r.department == "7"));
}

#[tokio::test]
async fn test_assign_role_permissions_department_check() {
    let h = harness().await;
    h.user(1, "jack", 7).await;
    let role = h.role_for(1, "Editor", "eng_editor", 7).await;
    let permissions = [Permission::new("/api/v1/docs", "PUT")];

    let err = h
        .service
        .assign_role_permissions(role.id, &permissions, Some(3))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(_)));
    assert!(!h.allowed(1, "/api/v1/docs", "PUT").await);

    h.service
        .assign_role_permissions(role.id, &permissions, Some(7))
        .await
        .unwrap();
    assert!(h.allowed(1, "/api/v1/docs", "PUT").await);

    // Without a department the rules are scoped `*` and applied immediately
    h.service
        .assign_role_permissions(role.id, &[Permission::new("/api/v1/wiki", "GET")], None)
        .await
        .unwrap();
    assert!(h.allowed(1, "/api/v1/wiki", "GET").await);
    assert!(!h.allowed(1, "/api/v1/docs", "PUT").await);
}

#[tokio::test]
async fn test_role_editing_unknown_role() {
    let h = harness().await;
    let err = h.service.update_role_permissions(404, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.service.role_permissions(404).await.is_err());
}

// ============================================================================
// TOKENS
// ============================================================================

#[tokio::test]
async fn test_bearer_token_lifecycle() {
    let h = harness().await;
    h.user(1, "kate", 7).await;

    let first = h.service.refresh_token(1, None).await.unwrap();
    let check = h
        .service
        .authorize_bearer(&first.token, "/api/v1/business/list", "GET")
        .await
        .unwrap();
    assert!(check.allowed);

    let second = h.service.refresh_token_with_version_increment(1, None).await.unwrap();
    assert_eq!(second.token_version, first.token_version + 1);

    let stale = h
        .service
        .authorize_bearer(&first.token, "/api/v1/business/list", "GET")
        .await
        .unwrap();
    assert!(!stale.allowed);
    assert_eq!(
        stale.reason,
        DecisionReason::TokenStale {
            claimed: first.token_version,
            current: second.token_version,
        }
    );

    assert!(h.service.authorize_bearer("not-a-jwt", "/api/v1/business/list", "GET").await.is_err());

    assert!(h
        .service
        .authorize_bearer(&second.token, "/api/v1/business/list", "GET")
        .await
        .unwrap()
        .allowed);
}

#[tokio::test]
async fn test_validate_token_version_matrix() {
    let h = harness().await;
    h.user(1, "liam", 7).await;
    for _ in 0..4 {
        h.service.refresh_token_with_version_increment(1, None).await.unwrap();
    }

    // current version is 5
    assert!(h.service.validate_token_version(1, 0).await.is_ok());
    assert!(matches!(
        h.service.validate_token_version(1, 3).await,
        Err(AuthzError::TokenStale { claimed: 3, current: 5 })
    ));
    assert!(h.service.validate_token_version(1, 5).await.is_ok());
}

#[tokio::test]
async fn test_metrics_track_decisions() {
    let h = harness().await;
    h.user(1, "mia", 7).await;
    h.service.init_system_admin(1).await.unwrap();

    assert!(h.allowed(1, "/api/v1/x", "GET").await);
    assert!(!h.allowed(99, "/api/v1/x", "GET").await);

    // one decision per check regardless of how many roles were tried
    let metrics = h.service.get_metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.allowed_decisions, 1);
    assert!(metrics.rule_evaluations >= 1);
    assert!(metrics.reloads >= 2);
    assert_eq!(metrics.active_rules, 2);
}
