//! Directory catalog traits
//!
//! Lookups return `Ok(None)` for a missing entity and reserve `Err` for
//! backend failures, so callers can tell "does not exist" apart from
//! "could not ask".

use crate::error::Result;
use crate::types::{
    ApiEndpoint, ApiId, Business, BusinessId, Department, DeptId, NewRole, Role, RoleId, User,
    UserId,
};
use async_trait::async_trait;

/// User lookup and token-version bookkeeping
#[async_trait]
pub trait UserCatalog: Send + Sync {
    /// Get a user by ID
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Store a new user, assigning an id when `user.id == 0`
    async fn create_user(&self, user: User) -> Result<User>;

    /// List users of one department
    async fn list_users_by_department(&self, dept_id: DeptId) -> Result<Vec<User>>;

    /// Role codes directly assigned to a user
    async fn user_roles(&self, id: UserId) -> Result<Vec<String>>;

    /// Replace the user's directly assigned roles
    async fn assign_roles(&self, id: UserId, role_ids: &[RoleId]) -> Result<()>;

    /// Atomically increment the user's token version and return the new value
    ///
    /// Implementations must perform the read-modify-write as one committed
    /// step; two concurrent calls must yield two distinct versions.
    async fn increment_token_version(&self, id: UserId) -> Result<u64>;
}

/// Role lookup and creation
#[async_trait]
pub trait RoleCatalog: Send + Sync {
    async fn get_role(&self, id: RoleId) -> Result<Option<Role>>;

    async fn get_role_by_code(&self, code: &str) -> Result<Option<Role>>;

    /// Create a role; fails with `Conflict` when the code is taken
    async fn create_role(&self, role: NewRole) -> Result<Role>;

    async fn list_roles_by_department(&self, dept_id: DeptId) -> Result<Vec<Role>>;

    async fn list_roles(&self) -> Result<Vec<Role>>;
}

/// Department lookup
#[async_trait]
pub trait DepartmentCatalog: Send + Sync {
    async fn get_department(&self, id: DeptId) -> Result<Option<Department>>;

    async fn create_department(&self, dept: Department) -> Result<Department>;

    /// Direct children of a department
    async fn list_children(&self, parent_id: DeptId) -> Result<Vec<Department>>;
}

/// Business line lookup
#[async_trait]
pub trait BusinessCatalog: Send + Sync {
    async fn get_business(&self, id: BusinessId) -> Result<Option<Business>>;

    async fn create_business(&self, business: Business) -> Result<Business>;

    async fn list_businesses_by_department(&self, dept_id: DeptId) -> Result<Vec<Business>>;
}

/// API endpoint catalog
#[async_trait]
pub trait ApiCatalog: Send + Sync {
    async fn get_api(&self, id: ApiId) -> Result<Option<ApiEndpoint>>;

    /// Find the endpoint registered for an exact path + verb
    async fn get_api_by_path(&self, path: &str, method: &str) -> Result<Option<ApiEndpoint>>;

    async fn create_api(&self, api: ApiEndpoint) -> Result<ApiEndpoint>;
}
