//! Department administrator delegation
//!
//! A department admin is an ordinary role `dept_admin_<dept>` carrying a
//! fixed bundle of department-scoped rules. Users are bound to it with a
//! grouping rule `user_<id> -> dept_admin_<dept>`.

use crate::error::{AuthzError, Result};
use crate::evaluator::PolicyEvaluator;
use crate::policy::{DeptScope, PolicyRule};
use crate::resolver::{parse_user_subject, user_subject, RoleResolver};
use crate::ADMIN_ROLE;
use apigov_core::{
    CoreError, Department, DepartmentCatalog, DeptId, NewRole, Role, RoleCatalog, User, UserCatalog, UserId,
    NO_DEPARTMENT,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Role code of a department's admin role
pub fn dept_admin_role(dept_id: DeptId) -> String {
    format!("dept_admin_{}", dept_id)
}

/// Resource matched by [`DeptDelegationManager::check_dept_permission`]
pub fn dept_resource_path(dept_id: DeptId) -> String {
    format!("/api/v1/dept/{}/*", dept_id)
}

/// The 16 rules seeded for a department admin role
pub fn dept_admin_bundle(dept_id: DeptId) -> Vec<PolicyRule> {
    let role = dept_admin_role(dept_id);
    let scope = DeptScope::Dept(dept_id);
    let mut rules = Vec::with_capacity(16);

    for family in ["users", "roles", "businesses"] {
        let collection = format!("/api/v1/dept/{}/{}", dept_id, family);
        let member = format!("{}/*", collection);
        rules.push(PolicyRule::permission(&role, &collection, "GET", scope));
        rules.push(PolicyRule::permission(&role, &collection, "POST", scope));
        rules.push(PolicyRule::permission(&role, &member, "PUT", scope));
        rules.push(PolicyRule::permission(&role, &member, "DELETE", scope));
    }

    rules.push(PolicyRule::permission(&role, "/api/v1/business/*/apis", "GET", scope));
    rules.push(PolicyRule::permission(&role, "/api/v1/business/*/apis", "POST", scope));
    rules.push(PolicyRule::permission(&role, "/api/v1/business/*/apis/*", "PUT", scope));
    rules.push(PolicyRule::permission(&role, "/api/v1/business/*/apis/*", "DELETE", scope));

    rules
}

/// Grants, revokes and checks department-admin rights
pub struct DeptDelegationManager {
    users: Arc<dyn UserCatalog>,
    roles: Arc<dyn RoleCatalog>,
    departments: Arc<dyn DepartmentCatalog>,
    resolver: Arc<RoleResolver>,
    evaluator: Arc<PolicyEvaluator>,
}

impl DeptDelegationManager {
    pub fn new(
        users: Arc<dyn UserCatalog>,
        roles: Arc<dyn RoleCatalog>,
        departments: Arc<dyn DepartmentCatalog>,
        resolver: Arc<RoleResolver>,
        evaluator: Arc<PolicyEvaluator>,
    ) -> Self {
        Self {
            users,
            roles,
            departments,
            resolver,
            evaluator,
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("user {}", user_id)))
    }

    async fn require_department(&self, dept_id: DeptId) -> Result<Department> {
        self.departments
            .get_department(dept_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("department {}", dept_id)))
    }

    /// Look a role up by code, creating it when absent
    ///
    /// Losing a creation race to a concurrent caller is not an error: the
    /// role that caller created is returned.
    async fn ensure_role(&self, role: NewRole) -> Result<Role> {
        if let Some(existing) = self.roles.get_role_by_code(&role.code).await? {
            return Ok(existing);
        }

        let code = role.code.clone();
        info!("creating role {}", code);
        match self.roles.create_role(role).await {
            Ok(created) => Ok(created),
            Err(CoreError::Conflict(msg)) => {
                debug!("role {} created concurrently: {}", code, msg);
                self.roles
                    .get_role_by_code(&code)
                    .await?
                    .ok_or_else(|| AuthzError::Conflict(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Make `user_id` an administrator of `dept_id`
    ///
    /// Seeding is not transactional: on error some rules may already be
    /// stored. Retrying is safe because re-inserting a rule is a no-op.
    pub async fn grant_dept_admin(&self, user_id: UserId, dept_id: DeptId) -> Result<()> {
        let user = self.require_user(user_id).await?;
        let dept = self.require_department(dept_id).await?;

        if user.dept_id != dept_id {
            return Err(AuthzError::forbidden(format!(
                "user {} does not belong to department {}",
                user_id, dept_id
            )));
        }

        let code = dept_admin_role(dept_id);
        self.ensure_role(
            NewRole::new(format!("{} department admin", dept.name), &code, dept_id)
                .with_description(format!("Administrator role of department {}", dept.name)),
        )
        .await?;

        self.evaluator
            .add_role_for_subject(&user_subject(user_id), &code)
            .await?;

        let mut inserted = 0;
        for rule in dept_admin_bundle(dept_id) {
            if self.evaluator.add_policy(&rule).await? {
                inserted += 1;
            }
        }

        self.evaluator.reload_from_store().await?;
        info!(
            "user {} granted {} ({} new rules)",
            user_id, code, inserted
        );
        Ok(())
    }

    /// Remove the user's binding; the role's rules stay in place
    pub async fn revoke_dept_admin(&self, user_id: UserId, dept_id: DeptId) -> Result<()> {
        self.require_user(user_id).await?;
        self.require_department(dept_id).await?;

        let code = dept_admin_role(dept_id);
        let removed = self
            .evaluator
            .delete_role_for_subject(&user_subject(user_id), &code)
            .await?;
        if !removed {
            warn!("user {} was not bound to {}", user_id, code);
        }

        self.evaluator.reload_from_store().await?;
        info!("user {} revoked from {}", user_id, code);
        Ok(())
    }

    /// Whether the user may perform `action` on department resources
    pub async fn check_dept_permission(&self, user_id: UserId, dept_id: DeptId, action: &str) -> Result<bool> {
        let roles = self.resolver.roles_for_user(user_id).await?;
        let code = dept_admin_role(dept_id);

        if roles.iter().any(|r| r == ADMIN_ROLE || *r == code) {
            return Ok(true);
        }

        let resource = dept_resource_path(dept_id);
        Ok(roles
            .iter()
            .any(|role| self.evaluator.enforce(role, &resource, action, dept_id)))
    }

    /// Bootstrap a system administrator with an unrestricted rule
    pub async fn init_system_admin(&self, user_id: UserId) -> Result<()> {
        self.require_user(user_id).await?;

        self.ensure_role(
            NewRole::new("System administrator", ADMIN_ROLE, NO_DEPARTMENT)
                .with_description("Super administrator with every permission"),
        )
        .await?;

        self.evaluator
            .add_role_for_subject(&user_subject(user_id), ADMIN_ROLE)
            .await?;
        self.evaluator
            .add_permission(ADMIN_ROLE, "*", "*", DeptScope::Any)
            .await?;

        self.evaluator.reload_from_store().await?;
        info!("user {} initialised as system administrator", user_id);
        Ok(())
    }

    /// Users bound to the department's admin role
    pub async fn dept_admins(&self, dept_id: DeptId) -> Result<Vec<User>> {
        self.require_department(dept_id).await?;

        let mut admins = Vec::new();
        for subject in self.evaluator.subjects_for_role(&dept_admin_role(dept_id)) {
            let Some(user_id) = parse_user_subject(&subject) else {
                continue;
            };
            if let Some(user) = self.users.get_user(user_id).await? {
                admins.push(user);
            }
        }
        Ok(admins)
    }
}
