//! Shared fixtures for integration tests

#![allow(dead_code)]

use apigov_authz::{
    AuthzConfig, AuthzError, AuthzService, Collaborators, InMemoryPolicyStore, PolicyFilter,
    PolicyRecord, PolicyRule, PolicyStore,
};
use apigov_core::{
    ApiCatalog, ApiEndpoint, CoreError, Department, DepartmentCatalog, DeptId, InMemoryDirectory,
    NewRole, Role, RoleCatalog, RoleId, User, UserCatalog, UserId,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

pub struct Harness {
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<InMemoryPolicyStore>,
    pub service: AuthzService,
}

/// Service over an empty directory with departments 3 (`ops`) and 7 (`eng`)
pub async fn harness() -> Harness {
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .create_department(Department::new(3, "Operations", "ops"))
        .await
        .unwrap();
    directory
        .create_department(Department::new(7, "Engineering", "eng"))
        .await
        .unwrap();

    let store = Arc::new(InMemoryPolicyStore::new());
    let service = AuthzService::start(
        AuthzConfig::default(),
        Collaborators::in_memory(directory.clone(), store.clone() as Arc<dyn PolicyStore>),
    )
    .await
    .unwrap();

    Harness {
        directory,
        store,
        service,
    }
}

impl Harness {
    pub async fn user(&self, id: u64, username: &str, dept_id: u64) -> User {
        self.directory
            .create_user(User::new(id, username, dept_id))
            .await
            .unwrap()
    }

    /// Create a role and assign it to `user_id` through the catalog
    pub async fn role_for(&self, user_id: u64, name: &str, code: &str, dept_id: u64) -> Role {
        let role = self
            .directory
            .create_role(NewRole::new(name, code, dept_id))
            .await
            .unwrap();
        self.directory_assign(user_id, role.id).await;
        role
    }

    /// Add an existing role to the user's catalog roles
    pub async fn directory_assign(&self, user_id: u64, role_id: u64) {
        let mut current: Vec<u64> = Vec::new();
        for existing in self.directory.user_roles(user_id).await.unwrap() {
            if let Some(r) = self.directory.get_role_by_code(&existing).await.unwrap() {
                current.push(r.id);
            }
        }
        current.push(role_id);
        self.directory.assign_roles(user_id, &current).await.unwrap();
    }

    pub async fn api(&self, id: u64, path: &str, method: &str) -> ApiEndpoint {
        self.directory
            .create_api(ApiEndpoint::new(id, path, method))
            .await
            .unwrap()
    }

    pub async fn allowed(&self, user_id: u64, path: &str, method: &str) -> bool {
        self.service
            .check_permission(user_id, path, method)
            .await
            .unwrap()
            .allowed
    }
}

// ============================================================================
// FAILURE INJECTION
// ============================================================================

/// Policy store whose scans and inserts can be made to fail
pub struct FailingPolicyStore {
    inner: InMemoryPolicyStore,
    fail_scan: AtomicBool,
    /// Inserts left before failing; negative means unlimited
    insert_budget: AtomicI64,
}

impl FailingPolicyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryPolicyStore::new(),
            fail_scan: AtomicBool::new(false),
            insert_budget: AtomicI64::new(-1),
        }
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more inserts through, then fail every insert
    pub fn fail_inserts_after(&self, n: i64) {
        self.insert_budget.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_scans(false);
        self.insert_budget.store(-1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PolicyStore for FailingPolicyStore {
    async fn insert(&self, rule: &PolicyRule) -> apigov_authz::Result<Option<i64>> {
        let admitted = self
            .insert_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                n if n < 0 => Some(n),
                n => Some(n - 1),
            });
        if admitted.is_err() {
            return Err(AuthzError::DatabaseError("insert rejected".to_string()));
        }
        self.inner.insert(rule).await
    }

    async fn update(&self, id: i64, rule: &PolicyRule) -> apigov_authz::Result<bool> {
        self.inner.update(id, rule).await
    }

    async fn delete(&self, id: i64) -> apigov_authz::Result<bool> {
        self.inner.delete(id).await
    }

    async fn delete_where(&self, filter: &PolicyFilter) -> apigov_authz::Result<u64> {
        self.inner.delete_where(filter).await
    }

    async fn scan(&self, filter: &PolicyFilter) -> apigov_authz::Result<Vec<PolicyRecord>> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(AuthzError::DatabaseError("scan rejected".to_string()));
        }
        self.inner.scan(filter).await
    }

    async fn get(&self, id: i64) -> apigov_authz::Result<Option<PolicyRecord>> {
        self.inner.get(id).await
    }

    async fn count_all(&self) -> apigov_authz::Result<u64> {
        self.inner.count_all().await
    }
}

/// User catalog whose reads can be made to fail
pub struct FailingUserCatalog {
    inner: Arc<InMemoryDirectory>,
    fail_reads: AtomicBool,
}

impl FailingUserCatalog {
    pub fn new(inner: Arc<InMemoryDirectory>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> apigov_core::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::storage("user catalog unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl UserCatalog for FailingUserCatalog {
    async fn get_user(&self, id: UserId) -> apigov_core::Result<Option<User>> {
        self.check()?;
        self.inner.get_user(id).await
    }

    async fn create_user(&self, user: User) -> apigov_core::Result<User> {
        self.inner.create_user(user).await
    }

    async fn list_users_by_department(&self, dept_id: DeptId) -> apigov_core::Result<Vec<User>> {
        self.check()?;
        self.inner.list_users_by_department(dept_id).await
    }

    async fn user_roles(&self, id: UserId) -> apigov_core::Result<Vec<String>> {
        self.check()?;
        self.inner.user_roles(id).await
    }

    async fn assign_roles(&self, id: UserId, role_ids: &[RoleId]) -> apigov_core::Result<()> {
        self.inner.assign_roles(id, role_ids).await
    }

    async fn increment_token_version(&self, id: UserId) -> apigov_core::Result<u64> {
        self.inner.increment_token_version(id).await
    }
}

pub struct FailureHarness {
    pub directory: Arc<InMemoryDirectory>,
    pub users: Arc<FailingUserCatalog>,
    pub store: Arc<FailingPolicyStore>,
    pub service: AuthzService,
}

/// Like [`harness`] with failure-injecting user catalog and policy store
pub async fn failure_harness() -> FailureHarness {
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .create_department(Department::new(7, "Engineering", "eng"))
        .await
        .unwrap();

    let users = Arc::new(FailingUserCatalog::new(directory.clone()));
    let store = Arc::new(FailingPolicyStore::new());
    let service = AuthzService::start(
        AuthzConfig::default(),
        Collaborators {
            users: users.clone(),
            roles: directory.clone(),
            departments: directory.clone(),
            apis: directory.clone(),
            policy_store: store.clone(),
        },
    )
    .await
    .unwrap();

    FailureHarness {
        directory,
        users,
        store,
        service,
    }
}

impl FailureHarness {
    pub async fn directory_user(&self, id: u64, username: &str, dept_id: u64) -> User {
        self.directory
            .create_user(User::new(id, username, dept_id))
            .await
            .unwrap()
    }

    pub async fn allowed(&self, user_id: u64, path: &str, method: &str) -> bool {
        self.service
            .check_permission(user_id, path, method)
            .await
            .unwrap()
            .allowed
    }
}
