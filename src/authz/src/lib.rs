//! # APIGov Authorization Engine
//!
//! Department-scoped role-based access control for API governance.
//!
//! ## Features
//!
//! - **Typed policy rules** with explicit wildcard variants
//! - **Atomic snapshots**: reloads build off to the side and swap one pointer
//! - **Department delegation** through `dept_admin_<id>` roles
//! - **Token versioning** to invalidate every token of a user at once
//! - **Pluggable persistence** (in-memory, or PostgreSQL with `postgres`)
//!
//! ## Example
//!
//! ```rust
//! use apigov_authz::{AuthzConfig, AuthzService, Collaborators, InMemoryPolicyStore};
//! use apigov_core::{Department, DepartmentCatalog, InMemoryDirectory, User, UserCatalog};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryDirectory::new());
//!     directory.create_department(Department::new(7, "Engineering", "eng")).await?;
//!     directory.create_user(User::new(1, "alice", 7)).await?;
//!
//!     let service = AuthzService::start(
//!         AuthzConfig::default(),
//!         Collaborators::in_memory(directory, Arc::new(InMemoryPolicyStore::new())),
//!     )
//!     .await?;
//!
//!     service.init_system_admin(1).await?;
//!     let check = service.check_permission(1, "/api/v1/anything", "DELETE").await?;
//!     assert!(check.allowed && check.is_admin);
//!
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod checker;
pub mod config;
pub mod delegation;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod policy;
pub mod resolver;
pub mod roles;
pub mod service;
pub mod telemetry;
pub mod token;

/// Role code of the system administrator
pub const ADMIN_ROLE: &str = "admin";

// Re-export commonly used types
pub use admin::{ListPolicies, NewPolicy, PolicyAdmin, PolicyPage};
pub use checker::{DecisionReason, PermissionCheck, PermissionChecker};
pub use config::{AuthzConfig, EvaluatorConfig, FastPathConfig, LogConfig, TokenConfig};
pub use delegation::{dept_admin_role, DeptDelegationManager};
pub use error::{AuthzError, ErrorKind, Result};
pub use evaluator::{PolicyEvaluator, PolicySnapshot, ReloadOutcome};
pub use metrics::{EngineMetrics, MetricsCollector};
pub use policy::{
    DeptScope, InMemoryPolicyStore, MethodMatch, PathPattern, PolicyFilter, PolicyRecord,
    PolicyRule, PolicyStore, RuleKind,
};
pub use resolver::{RoleResolver, ResolvedPrincipal};
pub use roles::{CreateRole, Permission, RolePolicyEditor, BASELINE_RESOURCES};
pub use service::{AuthzService, Collaborators};
pub use token::{IssuedToken, JwtTokenIssuer, TokenClaims, TokenIssuer, TokenVersionGuard};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
