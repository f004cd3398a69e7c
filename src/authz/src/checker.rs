//! Request-level permission checks

use crate::config::FastPathConfig;
use crate::error::{AuthzError, Result};
use crate::evaluator::PolicyEvaluator;
use crate::resolver::RoleResolver;
use crate::token::{TokenClaims, TokenVersionGuard};
use crate::ADMIN_ROLE;
use apigov_core::{DeptId, UserId, NO_DEPARTMENT};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Why a decision came out the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionReason {
    UserNotFound,
    /// Bearer token minted before the user's last version bump
    TokenStale { claimed: u64, current: u64 },
    /// Path is open to any user with a department
    DepartmentFastPath,
    PolicyMatch { role: String },
    NoMatchingPolicy,
}

/// Outcome of [`PermissionChecker::check_permission`]
#[derive(Debug, Clone, Serialize)]
pub struct PermissionCheck {
    pub allowed: bool,
    pub roles: Vec<String>,
    pub is_admin: bool,
    pub department_id: DeptId,
    pub reason: DecisionReason,
}

impl PermissionCheck {
    fn denied(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            roles: Vec::new(),
            is_admin: false,
            department_id: NO_DEPARTMENT,
            reason,
        }
    }
}

/// Combines role resolution, the department fast path and rule evaluation
pub struct PermissionChecker {
    resolver: Arc<RoleResolver>,
    evaluator: Arc<PolicyEvaluator>,
    tokens: Arc<TokenVersionGuard>,
    fast_path: FastPathConfig,
}

impl PermissionChecker {
    pub fn new(
        resolver: Arc<RoleResolver>,
        evaluator: Arc<PolicyEvaluator>,
        tokens: Arc<TokenVersionGuard>,
        fast_path: FastPathConfig,
    ) -> Self {
        Self {
            resolver,
            evaluator,
            tokens,
            fast_path,
        }
    }

    /// Decide whether `user_id` may call `method path`
    ///
    /// An unknown user yields a denied result, not an error. Errors are
    /// reserved for catalog failures.
    pub async fn check_permission(&self, user_id: UserId, path: &str, method: &str) -> Result<PermissionCheck> {
        let check = self.decide(user_id, path, method).await?;
        self.evaluator.metrics().record_decision(check.allowed);
        Ok(check)
    }

    /// Validate the token version in `claims`, then check the request
    ///
    /// A stale token is a denial with [`DecisionReason::TokenStale`].
    pub async fn check_claims(&self, claims: &TokenClaims, path: &str, method: &str) -> Result<PermissionCheck> {
        match self
            .tokens
            .validate_token_version(claims.user_id, claims.token_version)
            .await
        {
            Ok(()) => self.check_permission(claims.user_id, path, method).await,
            Err(AuthzError::TokenStale { claimed, current }) => {
                self.evaluator.metrics().record_decision(false);
                Ok(PermissionCheck::denied(DecisionReason::TokenStale { claimed, current }))
            }
            Err(AuthzError::NotFound(_)) => {
                self.evaluator.metrics().record_decision(false);
                Ok(PermissionCheck::denied(DecisionReason::UserNotFound))
            }
            Err(e) => Err(e),
        }
    }

    async fn decide(&self, user_id: UserId, path: &str, method: &str) -> Result<PermissionCheck> {
        let Some(principal) = self.resolver.resolve(user_id).await? else {
            debug!("permission check for unknown user {}", user_id);
            return Ok(PermissionCheck::denied(DecisionReason::UserNotFound));
        };

        let dept_id = principal.dept_id();
        let is_admin = principal.has_role(ADMIN_ROLE);

        let mut check = PermissionCheck {
            allowed: false,
            roles: principal.roles,
            is_admin,
            department_id: dept_id,
            reason: DecisionReason::NoMatchingPolicy,
        };

        if dept_id != NO_DEPARTMENT && self.fast_path.matches(path) {
            check.allowed = true;
            check.reason = DecisionReason::DepartmentFastPath;
            return Ok(check);
        }

        // A NO_DEPARTMENT lookup only matches `*`-scoped rules
        let matched = check.roles.iter().find(|role| {
            self.evaluator.enforce(role, path, method, dept_id)
                || self.evaluator.enforce(role, path, method, NO_DEPARTMENT)
        });

        if let Some(role) = matched {
            check.reason = DecisionReason::PolicyMatch { role: role.clone() };
            check.allowed = true;
        }

        debug!(
            "check user={} {} {} dept={} -> {} ({:?})",
            user_id, method, path, dept_id, check.allowed, check.reason
        );
        Ok(check)
    }
}
