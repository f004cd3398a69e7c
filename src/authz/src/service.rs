//! Wiring facade
//!
//! [`AuthzService`] builds every component around one shared
//! [`PolicyEvaluator`] and exposes the engine's operations in one place.

use crate::admin::PolicyAdmin;
use crate::checker::{PermissionCheck, PermissionChecker};
use crate::config::AuthzConfig;
use crate::delegation::DeptDelegationManager;
use crate::error::Result;
use crate::evaluator::{PolicyEvaluator, ReloadOutcome};
use crate::metrics::EngineMetrics;
use crate::policy::PolicyStore;
use crate::resolver::RoleResolver;
use crate::roles::{CreateRole, Permission, RolePolicyEditor};
use crate::token::{IssuedToken, JwtTokenIssuer, TokenClaims, TokenIssuer, TokenVersionGuard};
use apigov_core::{
    ApiCatalog, ApiId, DepartmentCatalog, DeptId, InMemoryDirectory, Role, RoleCatalog, RoleId,
    User, UserCatalog, UserId,
};
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

/// External collaborators the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserCatalog>,
    pub roles: Arc<dyn RoleCatalog>,
    pub departments: Arc<dyn DepartmentCatalog>,
    pub apis: Arc<dyn ApiCatalog>,
    pub policy_store: Arc<dyn PolicyStore>,
}

impl Collaborators {
    /// Back every catalog with one in-memory directory
    pub fn in_memory(directory: Arc<InMemoryDirectory>, policy_store: Arc<dyn PolicyStore>) -> Self {
        Self {
            users: directory.clone(),
            roles: directory.clone(),
            departments: directory.clone(),
            apis: directory,
            policy_store,
        }
    }
}

/// Authorization engine facade
pub struct AuthzService {
    evaluator: Arc<PolicyEvaluator>,
    checker: PermissionChecker,
    delegation: DeptDelegationManager,
    roles: RolePolicyEditor,
    tokens: Arc<TokenVersionGuard>,
    admin: PolicyAdmin,
}

impl AuthzService {
    /// Build the engine and load the current rule set
    pub async fn start(config: AuthzConfig, collaborators: Collaborators) -> Result<Self> {
        let issuer: Arc<dyn TokenIssuer> = Arc::new(JwtTokenIssuer::new(&config.token));
        Self::start_with_issuer(config, collaborators, issuer).await
    }

    /// Like [`start`](Self::start) with a custom token issuer
    pub async fn start_with_issuer(
        config: AuthzConfig,
        collaborators: Collaborators,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Result<Self> {
        let Collaborators {
            users,
            roles,
            departments,
            apis,
            policy_store,
        } = collaborators;

        let evaluator = Arc::new(PolicyEvaluator::load(policy_store, config.evaluator.clone()).await?);
        let resolver = Arc::new(RoleResolver::new(users.clone(), evaluator.clone()));
        let tokens = Arc::new(TokenVersionGuard::new(users.clone(), issuer));

        let service = Self {
            checker: PermissionChecker::new(
                resolver.clone(),
                evaluator.clone(),
                tokens.clone(),
                config.fast_path.clone(),
            ),
            delegation: DeptDelegationManager::new(
                users.clone(),
                roles.clone(),
                departments.clone(),
                resolver,
                evaluator.clone(),
            ),
            roles: RolePolicyEditor::new(users, roles, departments, apis, evaluator.clone()),
            admin: PolicyAdmin::new(evaluator.clone()),
            tokens,
            evaluator,
        };

        info!(
            "Authorization engine started with {} rules",
            service.evaluator.snapshot().len()
        );
        Ok(service)
    }

    pub fn evaluator(&self) -> &Arc<PolicyEvaluator> {
        &self.evaluator
    }

    pub fn admin(&self) -> &PolicyAdmin {
        &self.admin
    }

    pub fn tokens(&self) -> &Arc<TokenVersionGuard> {
        &self.tokens
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        self.evaluator.get_metrics()
    }

    // ---- checks ----

    pub async fn check_permission(&self, user_id: UserId, path: &str, method: &str) -> Result<PermissionCheck> {
        self.checker.check_permission(user_id, path, method).await
    }

    pub async fn check_claims(&self, claims: &TokenClaims, path: &str, method: &str) -> Result<PermissionCheck> {
        self.checker.check_claims(claims, path, method).await
    }

    /// Verify a bearer token and check the request it carries
    pub async fn authorize_bearer(&self, token: &str, path: &str, method: &str) -> Result<PermissionCheck> {
        let claims = self.tokens.issuer().verify(token)?;
        self.checker.check_claims(&claims, path, method).await
    }

    // ---- delegation ----

    pub async fn grant_dept_admin(&self, user_id: UserId, dept_id: DeptId) -> Result<()> {
        self.delegation.grant_dept_admin(user_id, dept_id).await
    }

    pub async fn revoke_dept_admin(&self, user_id: UserId, dept_id: DeptId) -> Result<()> {
        self.delegation.revoke_dept_admin(user_id, dept_id).await
    }

    pub async fn check_dept_permission(&self, user_id: UserId, dept_id: DeptId, action: &str) -> Result<bool> {
        self.delegation.check_dept_permission(user_id, dept_id, action).await
    }

    pub async fn init_system_admin(&self, user_id: UserId) -> Result<()> {
        self.delegation.init_system_admin(user_id).await
    }

    pub async fn dept_admins(&self, dept_id: DeptId) -> Result<Vec<User>> {
        self.delegation.dept_admins(dept_id).await
    }

    // ---- roles ----

    pub async fn create_role(&self, request: CreateRole) -> Result<Role> {
        self.roles.create_role(request).await
    }

    pub async fn update_role_permissions(&self, role_id: RoleId, permissions: &[Permission]) -> Result<()> {
        self.roles.update_role_permissions(role_id, permissions).await
    }

    pub async fn update_role_permissions_by_api_ids(
        &self,
        role_id: RoleId,
        api_ids: &[ApiId],
        dept_id: Option<DeptId>,
    ) -> Result<()> {
        self.roles
            .update_role_permissions_by_api_ids(role_id, api_ids, dept_id)
            .await
    }

    pub async fn assign_role_permissions(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
        dept_id: Option<DeptId>,
    ) -> Result<()> {
        self.roles
            .assign_role_permissions(role_id, permissions, dept_id)
            .await
    }

    pub async fn role_permissions(&self, role_id: RoleId) -> Result<Vec<Permission>> {
        self.roles.role_permissions(role_id).await
    }

    pub async fn role_api_ids(&self, role_id: RoleId) -> Result<Vec<ApiId>> {
        self.roles.role_api_ids(role_id).await
    }

    // ---- policy ----

    pub async fn reload_policy(&self) -> Result<ReloadOutcome> {
        self.evaluator.reload_from_store().await
    }

    // ---- tokens ----

    pub async fn validate_token_version(&self, user_id: UserId, claimed: u64) -> Result<()> {
        self.tokens.validate_token_version(user_id, claimed).await
    }

    pub async fn refresh_token(&self, user_id: UserId, ttl: Option<Duration>) -> Result<IssuedToken> {
        self.tokens.refresh_token(user_id, ttl).await
    }

    pub async fn refresh_token_with_version_increment(
        &self,
        user_id: UserId,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken> {
        self.tokens
            .refresh_token_with_version_increment(user_id, ttl)
            .await
    }
}
