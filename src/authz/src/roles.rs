//! Role permission editing
//!
//! Permission updates are a *selective replace*: every rule of the role whose
//! resource is not in [`BASELINE_RESOURCES`] is deleted, then the new set is
//! inserted. Baseline rules survive every update.

use crate::error::{AuthzError, Result};
use crate::evaluator::PolicyEvaluator;
use crate::policy::{DeptScope, PolicyFilter};
use crate::ADMIN_ROLE;
use apigov_core::{
    ApiCatalog, ApiId, DepartmentCatalog, DeptId, NewRole, Role, RoleCatalog, RoleId, UserCatalog,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resources that selective replace never removes
pub const BASELINE_RESOURCES: &[&str] = &[
    "/api/v1/apis*",
    "/api/v1/apis/*",
    "/api/v1/business/*",
    "/api/v1/business*",
    "/api/v1/departments*",
    "/api/v1/departments/*",
    "/api/v1/role",
    "/api/v1/role/*",
    "/api/v1/user",
    "/api/v1/user/*",
];

/// Role codes allowed to create roles outside their own department
const ROLE_ADMIN_CODES: &[&str] = &[ADMIN_ROLE, "system_admin"];

/// A `(path, method)` grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub path: String,
    pub method: String,
}

impl Permission {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }
}

/// Rules every new role starts with: department families read-only,
/// the rest unrestricted.
pub fn default_permissions() -> Vec<Permission> {
    BASELINE_RESOURCES
        .iter()
        .map(|path| {
            let method = if path.starts_with("/api/v1/departments") { "GET" } else { "*" };
            Permission::new(*path, method)
        })
        .collect()
}

/// Role creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    /// Local code; stored as `<dept code>_<code>`
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub dept_id: DeptId,
    /// Acting user; `None` skips the department ownership check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_id: Option<UserId>,
}

/// Edits the permission rules attached to roles
pub struct RolePolicyEditor {
    users: Arc<dyn UserCatalog>,
    roles: Arc<dyn RoleCatalog>,
    departments: Arc<dyn DepartmentCatalog>,
    apis: Arc<dyn ApiCatalog>,
    evaluator: Arc<PolicyEvaluator>,
}

impl RolePolicyEditor {
    pub fn new(
        users: Arc<dyn UserCatalog>,
        roles: Arc<dyn RoleCatalog>,
        departments: Arc<dyn DepartmentCatalog>,
        apis: Arc<dyn ApiCatalog>,
        evaluator: Arc<PolicyEvaluator>,
    ) -> Self {
        Self {
            users,
            roles,
            departments,
            apis,
            evaluator,
        }
    }

    async fn require_role(&self, role_id: RoleId) -> Result<Role> {
        self.roles
            .get_role(role_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("role {}", role_id)))
    }

    /// Delete every permission rule of `role_code` outside the baseline
    async fn delete_non_baseline(&self, role_code: &str) -> Result<usize> {
        let store = self.evaluator.store();
        let records = store
            .scan(&PolicyFilter::permissions().subject(role_code))
            .await?;

        let mut removed = 0;
        for record in records
            .iter()
            .filter(|r| !BASELINE_RESOURCES.contains(&r.resource.as_str()))
        {
            if store.delete(record.id).await? {
                removed += 1;
            }
        }
        debug!("removed {} non-baseline rules of {}", removed, role_code);
        Ok(removed)
    }

    async fn insert_permissions<'a, I>(&self, role_code: &str, permissions: I, scope: DeptScope) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut inserted = 0;
        for (path, method) in permissions {
            if self.evaluator.add_permission(role_code, path, method, scope).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Replace the role's non-baseline rules with `permissions`, scoped `*`
    pub async fn update_role_permissions(&self, role_id: RoleId, permissions: &[Permission]) -> Result<()> {
        let role = self.require_role(role_id).await?;

        self.delete_non_baseline(&role.code).await?;
        let inserted = self
            .insert_permissions(
                &role.code,
                permissions.iter().map(|p| (p.path.as_str(), p.method.as_str())),
                DeptScope::Any,
            )
            .await?;

        self.evaluator.reload_from_store().await?;
        info!("role {} permissions replaced ({} rules)", role.code, inserted);
        Ok(())
    }

    /// Like [`update_role_permissions`](Self::update_role_permissions) but
    /// grants resolved from API ids; unknown ids are skipped.
    pub async fn update_role_permissions_by_api_ids(
        &self,
        role_id: RoleId,
        api_ids: &[ApiId],
        dept_id: Option<DeptId>,
    ) -> Result<()> {
        let role = self.require_role(role_id).await?;

        self.delete_non_baseline(&role.code).await?;

        let mut endpoints = Vec::with_capacity(api_ids.len());
        for api_id in api_ids {
            match self.apis.get_api(*api_id).await {
                Ok(Some(api)) => endpoints.push(api),
                Ok(None) => debug!("skipping unknown api {}", api_id),
                Err(e) => warn!("skipping api {}: {}", api_id, e),
            }
        }

        let inserted = self
            .insert_permissions(
                &role.code,
                endpoints.iter().map(|a| (a.path.as_str(), a.method.as_str())),
                DeptScope::from_optional(dept_id),
            )
            .await?;

        self.evaluator.reload_from_store().await?;
        info!(
            "role {} permissions replaced from {} api ids ({} rules)",
            role.code,
            api_ids.len(),
            inserted
        );
        Ok(())
    }

    /// Department-constrained selective replace
    ///
    /// Fails with `Forbidden` when `dept_id` is given and the role belongs
    /// to another department.
    pub async fn assign_role_permissions(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
        dept_id: Option<DeptId>,
    ) -> Result<()> {
        let role = self.require_role(role_id).await?;
        let scope = DeptScope::from_optional(dept_id);

        if let DeptScope::Dept(dept) = scope {
            if role.dept_id != dept {
                return Err(AuthzError::forbidden(format!(
                    "role {} does not belong to department {}",
                    role.code, dept
                )));
            }
        }

        self.delete_non_baseline(&role.code).await?;
        self.insert_permissions(
            &role.code,
            permissions.iter().map(|p| (p.path.as_str(), p.method.as_str())),
            scope,
        )
        .await?;

        self.evaluator.reload_from_store().await?;
        info!("role {} permissions assigned", role.code);
        Ok(())
    }

    /// Create a department role and seed its default rules
    pub async fn create_role(&self, request: CreateRole) -> Result<Role> {
        let dept = self
            .departments
            .get_department(request.dept_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("department {}", request.dept_id)))?;

        if let Some(current_user_id) = request.current_user_id {
            let current = self
                .users
                .get_user(current_user_id)
                .await?
                .ok_or_else(|| AuthzError::not_found(format!("user {}", current_user_id)))?;
            let current_roles = self.users.user_roles(current_user_id).await?;
            let is_admin = current_roles
                .iter()
                .any(|r| ROLE_ADMIN_CODES.contains(&r.as_str()));

            if !is_admin && current.dept_id != request.dept_id {
                return Err(AuthzError::forbidden(format!(
                    "user {} may not create roles in department {}",
                    current_user_id, request.dept_id
                )));
            }
        }

        let existing = self.roles.list_roles_by_department(dept.id).await?;
        if existing.iter().any(|r| r.name == request.name) {
            return Err(AuthzError::Conflict(format!(
                "role name '{}' already exists in department {}",
                request.name, dept.id
            )));
        }

        let code = format!("{}_{}", dept.code, request.code);
        if self.roles.get_role_by_code(&code).await?.is_some() {
            return Err(AuthzError::Conflict(format!("role code '{}' already exists", code)));
        }

        let role = self
            .roles
            .create_role(NewRole::new(request.name, code, dept.id).with_description(request.description))
            .await?;

        let defaults = default_permissions();
        let seeded = self
            .insert_permissions(
                &role.code,
                defaults.iter().map(|p| (p.path.as_str(), p.method.as_str())),
                DeptScope::from_optional(Some(role.dept_id)),
            )
            .await;
        match seeded {
            Ok(_) => {
                if let Err(e) = self.evaluator.reload_from_store().await {
                    warn!("role {} created but reload failed: {}", role.code, e);
                }
            }
            Err(e) => warn!("role {} created without default permissions: {}", role.code, e),
        }

        info!("role {} created in department {}", role.code, dept.id);
        Ok(role)
    }

    /// Permission rules stored for a role
    pub async fn role_permissions(&self, role_id: RoleId) -> Result<Vec<Permission>> {
        let role = self.require_role(role_id).await?;
        let records = self
            .evaluator
            .store()
            .scan(&PolicyFilter::permissions().subject(&role.code))
            .await?;

        Ok(records
            .into_iter()
            .map(|r| Permission::new(r.resource, r.action))
            .collect())
    }

    /// API ids whose `(path, method)` exactly matches one of the role's rules
    pub async fn role_api_ids(&self, role_id: RoleId) -> Result<Vec<ApiId>> {
        let mut ids = Vec::new();
        for permission in self.role_permissions(role_id).await? {
            if let Ok(Some(api)) = self.apis.get_api_by_path(&permission.path, &permission.method).await {
                if !ids.contains(&api.id) {
                    ids.push(api.id);
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_permissions() {
        let defaults = default_permissions();
        assert_eq!(defaults.len(), BASELINE_RESOURCES.len());
        assert!(defaults.contains(&Permission::new("/api/v1/departments*", "GET")));
        assert!(defaults.contains(&Permission::new("/api/v1/departments/*", "GET")));
        assert!(defaults.contains(&Permission::new("/api/v1/user/*", "*")));
        assert!(defaults.contains(&Permission::new("/api/v1/business*", "*")));
    }

    #[test]
    fn test_create_role_request_deserializes() {
        let req: CreateRole =
            serde_json::from_str(r#"{"name": "Lead", "code": "lead", "dept_id": 3}"#).unwrap();
        assert_eq!(req.code, "lead");
        assert!(req.current_user_id.is_none());
        assert!(req.description.is_empty());
    }
}
