//! Directory entities: users, roles, departments, business lines, APIs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiId, BusinessId, DeptId, RoleId, UserId, NO_DEPARTMENT};

/// Enabled/disabled flag carried by every directory entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Disabled,
    #[default]
    Enabled,
}

/// Platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Owning department (`0` when the user belongs to none)
    pub dept_id: DeptId,
    #[serde(default)]
    pub status: EntityStatus,
    /// Monotonic counter embedded in every bearer token issued to this user
    pub token_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create an enabled user at token version 1
    pub fn new(id: UserId, username: impl Into<String>, dept_id: DeptId) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            name: String::new(),
            email: String::new(),
            dept_id,
            status: EntityStatus::Enabled,
            token_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_department(&self) -> bool {
        self.dept_id != NO_DEPARTMENT
    }
}

/// Role definition
///
/// Roles created inside a department carry a code prefixed with the
/// department code (`eng_lead`); system roles (`dept_id == 0`) do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Globally unique role code, used as the policy subject
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub dept_id: DeptId,
    #[serde(default)]
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_system(&self) -> bool {
        self.dept_id == NO_DEPARTMENT
    }
}

/// Role creation payload; the catalog assigns the id and timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub dept_id: DeptId,
}

impl NewRole {
    pub fn new(name: impl Into<String>, code: impl Into<String>, dept_id: DeptId) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            description: String::new(),
            dept_id,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Organizational department
///
/// Departments form a tree (`parent_id`, `level`), but the tree is only a
/// display concern: department-scoped policies never flow to children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DeptId,
    pub name: String,
    pub code: String,
    /// Parent department (`0` for top level)
    #[serde(default)]
    pub parent_id: DeptId,
    /// 1 = group, 2 = department, 3 = sub-department
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub status: EntityStatus,
}

fn default_level() -> u32 {
    1
}

impl Department {
    pub fn new(id: DeptId, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            code: code.into(),
            parent_id: NO_DEPARTMENT,
            level: 1,
            status: EntityStatus::Enabled,
        }
    }

    pub fn with_parent(mut self, parent_id: DeptId, level: u32) -> Self {
        self.parent_id = parent_id;
        self.level = level;
        self
    }
}

/// Business line owned by a department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub code: String,
    pub dept_id: DeptId,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub status: EntityStatus,
}

impl Business {
    pub fn new(id: BusinessId, name: impl Into<String>, code: impl Into<String>, dept_id: DeptId) -> Self {
        Self {
            id,
            name: name.into(),
            code: code.into(),
            dept_id,
            owner: String::new(),
            status: EntityStatus::Enabled,
        }
    }
}

/// Catalogued API endpoint (path + verb)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub id: ApiId,
    pub name: String,
    pub path: String,
    /// HTTP verb: GET, POST, PUT, DELETE
    pub method: String,
    #[serde(default)]
    pub business_id: BusinessId,
    #[serde(default)]
    pub category_id: u64,
    #[serde(default)]
    pub status: EntityStatus,
}

impl ApiEndpoint {
    pub fn new(id: ApiId, path: impl Into<String>, method: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id,
            name: path.clone(),
            path,
            method: method.into(),
            business_id: 0,
            category_id: 0,
            status: EntityStatus::Enabled,
        }
    }

    pub fn with_business(mut self, business_id: BusinessId) -> Self {
        self.business_id = business_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_starts_at_version_one() {
        let user = User::new(42, "alice", 7);
        assert_eq!(user.token_version, 1);
        assert!(user.has_department());
        assert!(!User::new(1, "root", NO_DEPARTMENT).has_department());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&EntityStatus::Enabled).unwrap();
        assert_eq!(json, "\"enabled\"");
    }

    #[test]
    fn test_department_defaults() {
        let dept: Department =
            serde_json::from_str(r#"{"id":3,"name":"Engineering","code":"eng"}"#).unwrap();
        assert_eq!(dept.level, 1);
        assert_eq!(dept.parent_id, NO_DEPARTMENT);
        assert_eq!(dept.status, EntityStatus::Enabled);
    }
}
