//! Evaluator metrics collection

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time copy of the evaluator counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineMetrics {
    /// Permission checks decided
    pub total_requests: u64,

    pub allowed_decisions: u64,
    pub denied_decisions: u64,

    /// Single `(role, path, method, department)` matches; a check makes
    /// zero or more of these
    pub rule_evaluations: u64,

    /// Successful snapshot reloads
    pub reloads: u64,

    /// Reloads refused or failed; the previous snapshot stayed live
    pub failed_reloads: u64,

    /// Rules in the live snapshot
    pub active_rules: u64,

    /// Average reload latency
    pub avg_reload_ms: f64,
}

impl EngineMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Lock-free metrics collector
///
/// Recording happens on the check hot path, so everything is a relaxed
/// atomic counter and snapshots are only approximately consistent.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_requests: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    rule_evaluations: AtomicU64,
    reloads: AtomicU64,
    failed_reloads: AtomicU64,
    active_rules: AtomicU64,
    reload_micros_total: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one permission check
    pub fn record_decision(&self, allowed: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rule_evaluation(&self) {
        self.rule_evaluations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published snapshot
    pub fn record_reload(&self, rules: usize, latency: Duration) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        self.active_rules.store(rules as u64, Ordering::Relaxed);
        self.reload_micros_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failed_reload(&self) {
        self.failed_reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn get_metrics(&self) -> EngineMetrics {
        let reloads = self.reloads.load(Ordering::Relaxed);
        let reload_micros = self.reload_micros_total.load(Ordering::Relaxed);

        EngineMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            allowed_decisions: self.allowed.load(Ordering::Relaxed),
            denied_decisions: self.denied.load(Ordering::Relaxed),
            rule_evaluations: self.rule_evaluations.load(Ordering::Relaxed),
            reloads,
            failed_reloads: self.failed_reloads.load(Ordering::Relaxed),
            active_rules: self.active_rules.load(Ordering::Relaxed),
            avg_reload_ms: if reloads == 0 {
                0.0
            } else {
                reload_micros as f64 / reloads as f64 / 1000.0
            },
        }
    }

    /// Reset decision and reload counters; `active_rules` is kept
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.allowed,
            &self.denied,
            &self.rule_evaluations,
            &self.reloads,
            &self.failed_reloads,
            &self.reload_micros_total,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_counters() {
        let collector = MetricsCollector::new();
        collector.record_decision(true);
        collector.record_decision(true);
        collector.record_decision(false);
        collector.record_rule_evaluation();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.rule_evaluations, 1);
        assert_eq!(metrics.allowed_decisions, 2);
        assert!((metrics.allow_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reload_latency_average() {
        let collector = MetricsCollector::new();
        collector.record_reload(10, Duration::from_millis(2));
        collector.record_reload(12, Duration::from_millis(4));
        collector.record_failed_reload();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.reloads, 2);
        assert_eq!(metrics.failed_reloads, 1);
        assert_eq!(metrics.active_rules, 12);
        assert!((metrics.avg_reload_ms - 3.0).abs() < 1e-9);

        collector.reset();
        let metrics = collector.get_metrics();
        assert_eq!(metrics.reloads, 0);
        assert_eq!(metrics.active_rules, 12);
    }
}
