//! In-memory implementation of every catalog trait
//!
//! Backed by `DashMap`, so per-entity updates (token version bumps) hold the
//! shard lock for the whole read-modify-write.

use crate::error::{CoreError, Result};
use crate::traits::{ApiCatalog, BusinessCatalog, DepartmentCatalog, RoleCatalog, UserCatalog};
use crate::types::{
    ApiEndpoint, ApiId, Business, BusinessId, Department, DeptId, NewRole, Role, RoleId, User,
    UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Thread-safe in-memory directory
pub struct InMemoryDirectory {
    users: DashMap<UserId, User>,
    user_roles: DashMap<UserId, Vec<RoleId>>,
    roles: DashMap<RoleId, Role>,
    role_codes: DashMap<String, RoleId>,
    departments: DashMap<DeptId, Department>,
    businesses: DashMap<BusinessId, Business>,
    apis: DashMap<ApiId, ApiEndpoint>,
    next_id: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            user_roles: DashMap::new(),
            roles: DashMap::new(),
            role_codes: DashMap::new(),
            departments: DashMap::new(),
            businesses: DashMap::new(),
            apis: DashMap::new(),
            next_id: AtomicU64::new(1000),
        }
    }

    fn allocate_id(&self, requested: u64) -> u64 {
        if requested != 0 {
            requested
        } else {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        }
    }

    /// Number of stored users
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserCatalog for InMemoryDirectory {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn create_user(&self, mut user: User) -> Result<User> {
        if self.users.iter().any(|u| u.username == user.username) {
            return Err(CoreError::conflict(format!("username '{}' already exists", user.username)));
        }
        user.id = self.allocate_id(user.id);
        if self.users.contains_key(&user.id) {
            return Err(CoreError::conflict(format!("user {} already exists", user.id)));
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users_by_department(&self, dept_id: DeptId) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.dept_id == dept_id)
            .map(|u| u.clone())
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn user_roles(&self, id: UserId) -> Result<Vec<String>> {
        let Some(role_ids) = self.user_roles.get(&id).map(|r| r.clone()) else {
            return Ok(Vec::new());
        };

        Ok(role_ids
            .iter()
            .filter_map(|rid| self.roles.get(rid).map(|r| r.code.clone()))
            .collect())
    }

    async fn assign_roles(&self, id: UserId, role_ids: &[RoleId]) -> Result<()> {
        if !self.users.contains_key(&id) {
            return Err(CoreError::not_found(format!("user {}", id)));
        }
        if let Some(missing) = role_ids.iter().find(|rid| !self.roles.contains_key(rid)) {
            return Err(CoreError::not_found(format!("role {}", missing)));
        }
        self.user_roles.insert(id, role_ids.to_vec());
        Ok(())
    }

    async fn increment_token_version(&self, id: UserId) -> Result<u64> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("user {}", id)))?;
        user.token_version += 1;
        user.updated_at = Utc::now();
        debug!("user {} token version -> {}", id, user.token_version);
        Ok(user.token_version)
    }
}

#[async_trait]
impl RoleCatalog for InMemoryDirectory {
    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        Ok(self.roles.get(&id).map(|r| r.clone()))
    }

    async fn get_role_by_code(&self, code: &str) -> Result<Option<Role>> {
        let Some(id) = self.role_codes.get(code).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.roles.get(&id).map(|r| r.clone()))
    }

    async fn create_role(&self, role: NewRole) -> Result<Role> {
        // The code entry stays locked until the role is stored, so a racing
        // create with the same code sees either nothing or the finished role.
        let slot = match self.role_codes.entry(role.code.clone()) {
            Entry::Occupied(_) => {
                return Err(CoreError::conflict(format!("role code '{}' already exists", role.code)));
            }
            Entry::Vacant(slot) => slot,
        };

        let now = Utc::now();
        let created = Role {
            id: self.allocate_id(0),
            name: role.name,
            code: role.code,
            description: role.description,
            dept_id: role.dept_id,
            status: Default::default(),
            created_at: now,
            updated_at: now,
        };
        self.roles.insert(created.id, created.clone());
        slot.insert(created.id);
        Ok(created)
    }

    async fn list_roles_by_department(&self, dept_id: DeptId) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .filter(|r| r.dept_id == dept_id)
            .map(|r| r.clone())
            .collect();
        roles.sort_by_key(|r| r.id);
        Ok(roles)
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.iter().map(|r| r.clone()).collect();
        roles.sort_by_key(|r| r.id);
        Ok(roles)
    }
}

#[async_trait]
impl DepartmentCatalog for InMemoryDirectory {
    async fn get_department(&self, id: DeptId) -> Result<Option<Department>> {
        Ok(self.departments.get(&id).map(|d| d.clone()))
    }

    async fn create_department(&self, mut dept: Department) -> Result<Department> {
        if self.departments.iter().any(|d| d.code == dept.code) {
            return Err(CoreError::conflict(format!("department code '{}' already exists", dept.code)));
        }
        dept.id = self.allocate_id(dept.id);
        self.departments.insert(dept.id, dept.clone());
        Ok(dept)
    }

    async fn list_children(&self, parent_id: DeptId) -> Result<Vec<Department>> {
        let mut children: Vec<Department> = self
            .departments
            .iter()
            .filter(|d| d.parent_id == parent_id && d.id != parent_id)
            .map(|d| d.clone())
            .collect();
        children.sort_by_key(|d| d.id);
        Ok(children)
    }
}

#[async_trait]
impl BusinessCatalog for InMemoryDirectory {
    async fn get_business(&self, id: BusinessId) -> Result<Option<Business>> {
        Ok(self.businesses.get(&id).map(|b| b.clone()))
    }

    async fn create_business(&self, mut business: Business) -> Result<Business> {
        business.id = self.allocate_id(business.id);
        self.businesses.insert(business.id, business.clone());
        Ok(business)
    }

    async fn list_businesses_by_department(&self, dept_id: DeptId) -> Result<Vec<Business>> {
        let mut list: Vec<Business> = self
            .businesses
            .iter()
            .filter(|b| b.dept_id == dept_id)
            .map(|b| b.clone())
            .collect();
        list.sort_by_key(|b| b.id);
        Ok(list)
    }
}

#[async_trait]
impl ApiCatalog for InMemoryDirectory {
    async fn get_api(&self, id: ApiId) -> Result<Option<ApiEndpoint>> {
        Ok(self.apis.get(&id).map(|a| a.clone()))
    }

    async fn get_api_by_path(&self, path: &str, method: &str) -> Result<Option<ApiEndpoint>> {
        Ok(self
            .apis
            .iter()
            .find(|a| a.path == path && a.method.eq_ignore_ascii_case(method))
            .map(|a| a.clone()))
    }

    async fn create_api(&self, mut api: ApiEndpoint) -> Result<ApiEndpoint> {
        api.id = self.allocate_id(api.id);
        self.apis.insert(api.id, api.clone());
        Ok(api)
    }
}
