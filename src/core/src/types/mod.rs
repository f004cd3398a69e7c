//! Entity types shared by catalogs and the authorization engine

mod directory;

pub use directory::*;

/// User identifier
pub type UserId = u64;

/// Department identifier (`0` = no department / system scope)
pub type DeptId = u64;

/// Role identifier
pub type RoleId = u64;

/// Business line identifier
pub type BusinessId = u64;

/// API endpoint identifier
pub type ApiId = u64;

/// Department id used for system roles and users outside any department
pub const NO_DEPARTMENT: DeptId = 0;
