//! Raw policy administration
//!
//! CRUD over persisted policy records for operators. Every mutation writes
//! the store and then reloads the evaluator.

use crate::error::{AuthzError, Result};
use crate::evaluator::{PolicyEvaluator, ReloadOutcome};
use crate::policy::{PolicyFilter, PolicyId, PolicyRecord, PolicyRule, RuleKind, WILDCARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const DEFAULT_PAGE_SIZE: usize = 10;

/// Listing request; `page` is 1-based
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListPolicies {
    pub page: usize,
    pub page_size: usize,
    pub kind: Option<RuleKind>,
    /// Substring of the subject column
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyPage {
    pub items: Vec<PolicyRecord>,
    /// Matching records across all pages
    pub total: usize,
}

/// Operator-supplied rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicy {
    pub kind: RuleKind,
    pub subject: String,
    pub resource: String,
    #[serde(default)]
    pub action: String,
    /// Defaults to `*`
    #[serde(default)]
    pub department: Option<String>,
    /// Defaults to `allow`
    #[serde(default)]
    pub effect: Option<String>,
}

impl NewPolicy {
    pub fn permission(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            kind: RuleKind::Permission,
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
            department: None,
            effect: None,
        }
    }

    pub fn grouping(subject: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Grouping,
            subject: subject.into(),
            resource: role.into(),
            action: String::new(),
            department: None,
            effect: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Apply defaults and validate
    pub fn into_rule(self) -> Result<PolicyRule> {
        let record = match self.kind {
            RuleKind::Permission => PolicyRecord {
                id: 0,
                rule_type: self.kind.as_ptype().to_string(),
                subject: self.subject,
                resource: self.resource,
                action: self.action,
                department: self
                    .department
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| WILDCARD.to_string()),
                effect: self
                    .effect
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "allow".to_string()),
            },
            RuleKind::Grouping => PolicyRecord {
                id: 0,
                rule_type: self.kind.as_ptype().to_string(),
                subject: self.subject,
                resource: self.resource,
                action: String::new(),
                department: String::new(),
                effect: String::new(),
            },
        };

        record.to_rule().map_err(|e| AuthzError::InvalidInput(e.to_string()))
    }
}

/// Policy administration service
pub struct PolicyAdmin {
    evaluator: Arc<PolicyEvaluator>,
}

impl PolicyAdmin {
    pub fn new(evaluator: Arc<PolicyEvaluator>) -> Self {
        Self { evaluator }
    }

    pub async fn list(&self, request: &ListPolicies) -> Result<PolicyPage> {
        let page = request.page.max(1);
        let page_size = if request.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            request.page_size
        };

        let mut filter = PolicyFilter::new();
        filter.kind = request.kind;
        filter.subject_contains = request.subject.clone().filter(|s| !s.is_empty());

        let records = self.evaluator.store().scan(&filter).await?;
        let total = records.len();
        let items = records
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(PolicyPage { items, total })
    }

    /// Store a rule; `Conflict` if the identical rule exists
    pub async fn add(&self, policy: NewPolicy) -> Result<PolicyId> {
        let rule = policy.into_rule()?;
        let id = self
            .evaluator
            .store()
            .insert(&rule)
            .await?
            .ok_or_else(|| AuthzError::Conflict("policy already exists".to_string()))?;

        self.evaluator.reload_from_store().await?;
        info!("policy {} added", id);
        Ok(id)
    }

    pub async fn update(&self, id: PolicyId, policy: NewPolicy) -> Result<()> {
        let rule = policy.into_rule()?;
        if !self.evaluator.store().update(id, &rule).await? {
            return Err(AuthzError::not_found(format!("policy {}", id)));
        }

        self.evaluator.reload_from_store().await?;
        info!("policy {} updated", id);
        Ok(())
    }

    pub async fn delete(&self, id: PolicyId) -> Result<()> {
        if !self.evaluator.store().delete(id).await? {
            return Err(AuthzError::not_found(format!("policy {}", id)));
        }

        self.evaluator.reload_from_store().await?;
        info!("policy {} deleted", id);
        Ok(())
    }

    /// Delete several records; nothing is deleted if any id is unknown
    pub async fn batch_delete(&self, ids: &[PolicyId]) -> Result<()> {
        if ids.is_empty() {
            return Err(AuthzError::InvalidInput("no policy ids given".to_string()));
        }

        let store = self.evaluator.store();
        for id in ids {
            if store.get(*id).await?.is_none() {
                return Err(AuthzError::not_found(format!("policy {}", id)));
            }
        }
        for id in ids {
            store.delete(*id).await?;
        }

        self.evaluator.reload_from_store().await?;
        info!("{} policies deleted", ids.len());
        Ok(())
    }

    pub async fn reload(&self) -> Result<ReloadOutcome> {
        self.evaluator.reload_from_store().await
    }
}
