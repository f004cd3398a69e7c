//! Policy evaluator
//!
//! Holds an immutable [`PolicySnapshot`] built from the durable store. Every
//! `enforce` call clones the current `Arc` under a short read lock and then
//! evaluates without holding any lock; `reload_from_store` builds a complete
//! replacement off to the side and publishes it with one pointer swap, so a
//! reader observes either the old rule set or the new one.

use crate::config::EvaluatorConfig;
use crate::error::{AuthzError, Result};
use crate::metrics::{EngineMetrics, MetricsCollector};
use crate::policy::{
    DeptScope, PathMatcher, PermissionRule, PolicyFilter, PolicyRecord, PolicyRule, PolicyStore,
};
use apigov_core::DeptId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct CompiledPermission {
    rule: PermissionRule,
    matcher: PathMatcher,
}

impl CompiledPermission {
    fn matches(&self, path: &str, method: &str, dept_id: DeptId) -> bool {
        self.rule.action.matches(method)
            && self.rule.department.matches(dept_id)
            && self.matcher.matches(path)
    }
}

/// Immutable, fully compiled rule set
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    /// Permission rules keyed by role code
    permissions: HashMap<String, Vec<CompiledPermission>>,
    /// subject -> roles
    roles_by_subject: HashMap<String, Vec<String>>,
    /// role -> subjects
    subjects_by_role: HashMap<String, Vec<String>>,
    rule_count: usize,
    generation: u64,
    loaded_at: Option<DateTime<Utc>>,
}

impl PolicySnapshot {
    /// Compile a snapshot from persisted records
    ///
    /// Records that fail to decode are skipped with a warning; the returned
    /// count tells the caller how many were dropped.
    pub fn build(records: &[PolicyRecord], generation: u64) -> (Self, usize) {
        let mut snapshot = PolicySnapshot {
            generation,
            loaded_at: Some(Utc::now()),
            ..Default::default()
        };
        let mut skipped = 0;

        for record in records {
            let rule = match record.to_rule() {
                Ok(rule) => rule,
                Err(e) => {
                    warn!("Skipping policy {}: {}", record.id, e);
                    skipped += 1;
                    continue;
                }
            };

            match rule {
                PolicyRule::Permission(rule) => {
                    let matcher = match rule.resource.compile() {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("Skipping policy {}: {}", record.id, e);
                            skipped += 1;
                            continue;
                        }
                    };
                    snapshot
                        .permissions
                        .entry(rule.subject.clone())
                        .or_default()
                        .push(CompiledPermission { rule, matcher });
                }
                PolicyRule::Grouping(g) => {
                    let roles = snapshot.roles_by_subject.entry(g.subject.clone()).or_default();
                    if !roles.contains(&g.role) {
                        roles.push(g.role.clone());
                    }
                    let subjects = snapshot.subjects_by_role.entry(g.role).or_default();
                    if !subjects.contains(&g.subject) {
                        subjects.push(g.subject);
                    }
                }
            }
            snapshot.rule_count += 1;
        }

        (snapshot, skipped)
    }

    /// Evaluate one role against a request
    pub fn enforce(&self, role: &str, path: &str, method: &str, dept_id: DeptId) -> bool {
        self.permissions
            .get(role)
            .map(|rules| rules.iter().any(|r| r.matches(path, method, dept_id)))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }

    /// Monotonic reload counter; `0` for a never-loaded evaluator
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

/// Result of a successful reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub generation: u64,
    pub rules: usize,
    pub skipped: usize,
}

/// Rule matcher backed by a durable [`PolicyStore`]
pub struct PolicyEvaluator {
    store: Arc<dyn PolicyStore>,
    snapshot: RwLock<Arc<PolicySnapshot>>,
    reload_lock: tokio::sync::Mutex<()>,
    metrics: MetricsCollector,
    config: EvaluatorConfig,
}

impl PolicyEvaluator {
    /// Create an evaluator with an empty snapshot
    pub fn new(store: Arc<dyn PolicyStore>, config: EvaluatorConfig) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(PolicySnapshot::default())),
            reload_lock: tokio::sync::Mutex::new(()),
            metrics: MetricsCollector::new(),
            config,
        }
    }

    /// Create an evaluator and load the store's current rules
    pub async fn load(store: Arc<dyn PolicyStore>, config: EvaluatorConfig) -> Result<Self> {
        let evaluator = Self::new(store, config);
        evaluator.reload_from_store().await?;
        Ok(evaluator)
    }

    /// Durable store backing this evaluator
    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().clone()
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        self.metrics.get_metrics()
    }

    /// Collector shared with the permission checker
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Decide whether `role` may call `method path` from department `dept_id`
    pub fn enforce(&self, role: &str, path: &str, method: &str, dept_id: DeptId) -> bool {
        let allowed = self.snapshot().enforce(role, path, method, dept_id);
        self.metrics.record_rule_evaluation();
        debug!(
            "enforce role={} path={} method={} dept={} -> {}",
            role, path, method, dept_id, allowed
        );
        allowed
    }

    /// Persist a rule. Returns `false` if the identical rule already existed.
    ///
    /// The snapshot is unchanged until the next reload.
    pub async fn add_policy(&self, rule: &PolicyRule) -> Result<bool> {
        Ok(self.store.insert(rule).await?.is_some())
    }

    /// Persist a permission grant built from raw path/method strings
    pub async fn add_permission(
        &self,
        role: &str,
        path: &str,
        method: &str,
        department: DeptScope,
    ) -> Result<bool> {
        self.add_policy(&PolicyRule::permission(role, path, method, department))
            .await
    }

    /// Delete every stored copy of the rule
    pub async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool> {
        Ok(self.store.delete_where(&PolicyFilter::exact(rule)).await? > 0)
    }

    pub async fn remove_filtered_policy(&self, filter: &PolicyFilter) -> Result<u64> {
        self.store.delete_where(filter).await
    }

    /// Bind `subject` to `role` with a grouping rule
    pub async fn add_role_for_subject(&self, subject: &str, role: &str) -> Result<bool> {
        self.add_policy(&PolicyRule::grouping(subject, role)).await
    }

    pub async fn delete_role_for_subject(&self, subject: &str, role: &str) -> Result<bool> {
        self.remove_policy(&PolicyRule::grouping(subject, role)).await
    }

    /// Roles bound to `subject` in the live snapshot
    pub fn roles_for_subject(&self, subject: &str) -> Vec<String> {
        self.snapshot()
            .roles_by_subject
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    /// Subjects bound to `role` in the live snapshot
    pub fn subjects_for_role(&self, role: &str) -> Vec<String> {
        self.snapshot()
            .subjects_by_role
            .get(role)
            .cloned()
            .unwrap_or_default()
    }

    /// Permission rules of one role in the live snapshot
    pub fn filtered_policy(&self, role: &str) -> Vec<PermissionRule> {
        self.snapshot()
            .permissions
            .get(role)
            .map(|rules| rules.iter().map(|r| r.rule.clone()).collect())
            .unwrap_or_default()
    }

    /// Rebuild the snapshot from the store and publish it
    ///
    /// On any error the previous snapshot stays live.
    pub async fn reload_from_store(&self) -> Result<ReloadOutcome> {
        let _guard = self.reload_lock.lock().await;
        let started = Instant::now();

        let records = match self.store.scan(&PolicyFilter::new()).await {
            Ok(records) => records,
            Err(e) => {
                self.metrics.record_failed_reload();
                warn!("Policy reload failed, keeping current snapshot: {}", e);
                return Err(AuthzError::Internal(format!("policy reload failed: {}", e)));
            }
        };

        let current = self.snapshot();
        let (next, skipped) = PolicySnapshot::build(&records, current.generation() + 1);

        // An empty rule set only replaces live rules if the store agrees it
        // holds nothing.
        if self.config.refuse_empty_reload && next.is_empty() && !current.is_empty() {
            let stored = match self.store.count_all().await {
                Ok(count) => count,
                Err(e) => {
                    self.metrics.record_failed_reload();
                    warn!("Policy count failed, keeping current snapshot: {}", e);
                    return Err(AuthzError::Internal(format!("policy reload failed: {}", e)));
                }
            };
            if stored > 0 {
                self.metrics.record_failed_reload();
                warn!(
                    "Refusing to replace {} live rules with an empty rule set ({} records read, {} stored)",
                    current.len(),
                    records.len(),
                    stored
                );
                return Err(AuthzError::Internal(format!(
                    "store holds {} policies but the reload produced none",
                    stored
                )));
            }
        }

        let outcome = ReloadOutcome {
            generation: next.generation(),
            rules: next.len(),
            skipped,
        };
        *self.snapshot.write() = Arc::new(next);
        self.metrics.record_reload(outcome.rules, started.elapsed());

        info!(
            "Policy snapshot {} published: {} rules ({} skipped)",
            outcome.generation, outcome.rules, outcome.skipped
        );
        Ok(outcome)
    }
}
