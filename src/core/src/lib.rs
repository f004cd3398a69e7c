//! # APIGov Core
//!
//! Shared entity types, catalog traits, and error handling for the APIGov
//! platform. The authorization engine consumes users, roles, departments,
//! business lines and API endpoints exclusively through the traits defined
//! here, so persistence can be swapped without touching policy code.

pub mod types;
pub mod traits;
pub mod error;
pub mod memory;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use memory::InMemoryDirectory;
pub use traits::{ApiCatalog, BusinessCatalog, DepartmentCatalog, RoleCatalog, UserCatalog};
pub use types::{
    ApiEndpoint, ApiId, Business, BusinessId, Department, DeptId, EntityStatus, NewRole, Role,
    RoleId, User, UserId, NO_DEPARTMENT,
};
