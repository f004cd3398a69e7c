//! Role and department resolution for a user

use crate::error::Result;
use crate::evaluator::PolicyEvaluator;
use apigov_core::{DeptId, User, UserCatalog, UserId};
use std::sync::Arc;

const USER_SUBJECT_PREFIX: &str = "user_";

/// Policy subject for a user (`user_<id>`)
pub fn user_subject(user_id: UserId) -> String {
    format!("{}{}", USER_SUBJECT_PREFIX, user_id)
}

/// Inverse of [`user_subject`]
pub fn parse_user_subject(subject: &str) -> Option<UserId> {
    subject.strip_prefix(USER_SUBJECT_PREFIX)?.parse().ok()
}

/// A user together with every role code that applies to it
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    pub user: User,
    /// Catalog roles first, then grouping bindings; no duplicates
    pub roles: Vec<String>,
}

impl ResolvedPrincipal {
    pub fn dept_id(&self) -> DeptId {
        self.user.dept_id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resolves a user's effective roles
pub struct RoleResolver {
    users: Arc<dyn UserCatalog>,
    evaluator: Arc<PolicyEvaluator>,
}

impl RoleResolver {
    pub fn new(users: Arc<dyn UserCatalog>, evaluator: Arc<PolicyEvaluator>) -> Self {
        Self { users, evaluator }
    }

    /// Resolve a user; `Ok(None)` if the user does not exist
    pub async fn resolve(&self, user_id: UserId) -> Result<Option<ResolvedPrincipal>> {
        let Some(user) = self.users.get_user(user_id).await? else {
            return Ok(None);
        };
        let roles = self.roles_for_user(user_id).await?;
        Ok(Some(ResolvedPrincipal { user, roles }))
    }

    /// Catalog roles ∪ grouping bindings of `user_<id>`
    pub async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
        let mut roles = self.users.user_roles(user_id).await?;
        for role in self.evaluator.roles_for_subject(&user_subject(user_id)) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}
