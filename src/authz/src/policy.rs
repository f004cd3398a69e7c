//! Policy rule storage

use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod rule;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresPolicyStore;

pub use rule::{
    DeptScope, Effect, GroupingRule, MethodMatch, PathMatcher, PathPattern, PermissionRule,
    PolicyId, PolicyRecord, PolicyRule, RuleKind, WILDCARD,
};

/// Column filter over persisted policy records
///
/// Unset fields match everything. `subject_contains` is a substring match
/// used by the admin listing; every other field is an exact match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFilter {
    pub kind: Option<RuleKind>,
    pub subject: Option<String>,
    pub subject_contains: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub department: Option<String>,
}

impl PolicyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission rules only
    pub fn permissions() -> Self {
        Self::new().kind(RuleKind::Permission)
    }

    /// Grouping rules only
    pub fn groupings() -> Self {
        Self::new().kind(RuleKind::Grouping)
    }

    /// Filter matching exactly one rule's columns
    pub fn exact(rule: &PolicyRule) -> Self {
        let record = PolicyRecord::from_rule(0, rule);
        let filter = Self::new()
            .kind(rule.kind())
            .subject(record.subject)
            .resource(record.resource);
        match rule {
            PolicyRule::Permission(_) => filter.action(record.action).department(record.department),
            PolicyRule::Grouping(_) => filter,
        }
    }

    pub fn kind(mut self, kind: RuleKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn subject_contains(mut self, needle: impl Into<String>) -> Self {
        self.subject_contains = Some(needle.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn matches(&self, record: &PolicyRecord) -> bool {
        fn eq(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }

        self.kind.map_or(true, |k| k.as_ptype() == record.rule_type)
            && eq(&self.subject, &record.subject)
            && self
                .subject_contains
                .as_deref()
                .map_or(true, |n| record.subject.contains(n))
            && eq(&self.resource, &record.resource)
            && eq(&self.action, &record.action)
            && eq(&self.department, &record.department)
    }
}

/// Durable store of policy rules
///
/// The store is the source of truth; evaluators only ever see what a
/// `scan` returned at their last reload.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a rule. Returns `None` when an identical rule already exists.
    async fn insert(&self, rule: &PolicyRule) -> Result<Option<PolicyId>>;

    /// Replace the rule stored under `id`. Returns `false` if `id` is unknown.
    async fn update(&self, id: PolicyId, rule: &PolicyRule) -> Result<bool>;

    /// Delete one record. Returns `false` if `id` is unknown.
    async fn delete(&self, id: PolicyId) -> Result<bool>;

    /// Delete every record matching the filter, returning how many went away
    async fn delete_where(&self, filter: &PolicyFilter) -> Result<u64>;

    /// Records matching the filter, ordered by id
    async fn scan(&self, filter: &PolicyFilter) -> Result<Vec<PolicyRecord>>;

    async fn get(&self, id: PolicyId) -> Result<Option<PolicyRecord>>;

    async fn count_all(&self) -> Result<u64>;
}

/// In-memory policy store implementation
pub struct InMemoryPolicyStore {
    records: Arc<RwLock<BTreeMap<PolicyId, PolicyRecord>>>,
    next_id: Arc<RwLock<PolicyId>>,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn insert(&self, rule: &PolicyRule) -> Result<Option<PolicyId>> {
        let mut records = self.records.write().await;
        let candidate = PolicyRecord::from_rule(0, rule);
        if records.values().any(|r| r.same_rule(&candidate)) {
            return Ok(None);
        }

        let mut next_id = self.next_id.write().await;
        let id = *next_id;
        *next_id += 1;

        records.insert(id, PolicyRecord { id, ..candidate });
        Ok(Some(id))
    }

    async fn update(&self, id: PolicyId, rule: &PolicyRule) -> Result<bool> {
        let mut records = self.records.write().await;
        if !records.contains_key(&id) {
            return Ok(false);
        }

        let replacement = PolicyRecord::from_rule(id, rule);
        if let Some(clash) = records
            .values()
            .find(|r| r.id != id && r.same_rule(&replacement))
        {
            return Err(AuthzError::Conflict(format!(
                "policy {} already holds this rule",
                clash.id
            )));
        }

        records.insert(id, replacement);
        Ok(true)
    }

    async fn delete(&self, id: PolicyId) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(&id).is_some())
    }

    async fn delete_where(&self, filter: &PolicyFilter) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !filter.matches(r));
        Ok((before - records.len()) as u64)
    }

    async fn scan(&self, filter: &PolicyFilter) -> Result<Vec<PolicyRecord>> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn get(&self, id: PolicyId) -> Result<Option<PolicyRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn count_all(&self) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records.len() as u64)
    }
}
