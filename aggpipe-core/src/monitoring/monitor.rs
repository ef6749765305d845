//! Rolling query history with threshold alerts.
//!
//! The monitor keeps the most recent executions and alerts in bounded FIFO
//! buffers. Each recorded execution is checked against four rules; high
//! severity alerts are logged at error level and forwarded to the optional
//! alert handler as soon as they are raised.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use super::suggestions;
use super::types::{
    AlertSeverity, AlertType, CollectionStats, PerformanceAlert, PerformanceStats, QueryMetrics,
};
use crate::config::MonitorConfig;
use crate::pipeline::Stage;

/// Callback invoked for every high severity alert.
pub type AlertHandler = Arc<dyn Fn(&PerformanceAlert) + Send + Sync>;

/// Collects query metrics and raises alerts
pub struct PerformanceMonitor {
    config: MonitorConfig,
    history: RwLock<VecDeque<QueryMetrics>>,
    alerts: RwLock<VecDeque<PerformanceAlert>>,
    alert_handler: Option<AlertHandler>,
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("history_len", &self.history.read().len())
            .field("alerts_len", &self.alerts.read().len())
            .field("alert_handler", &self.alert_handler.is_some())
            .finish()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PerformanceMonitor {
    /// Creates a monitor with the given thresholds and capacities
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(config.history_capacity.min(1024))),
            alerts: RwLock::new(VecDeque::new()),
            alert_handler: None,
            config,
        }
    }

    /// Forward high severity alerts to `handler`
    pub fn with_alert_handler(mut self, handler: AlertHandler) -> Self {
        self.alert_handler = Some(handler);
        self
    }

    /// Thresholds in effect
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Records one execution and returns the alerts it raised
    ///
    /// The oldest entry is dropped once the history is full.
    pub fn record_metrics(&self, metrics: QueryMetrics) -> Vec<PerformanceAlert> {
        let raised = self.evaluate(&metrics);

        {
            let mut history = self.history.write();
            history.push_back(metrics);
            while history.len() > self.config.history_capacity {
                history.pop_front();
            }
        }

        if !raised.is_empty() {
            let mut alerts = self.alerts.write();
            alerts.extend(raised.iter().cloned());
            while alerts.len() > self.config.alert_capacity {
                alerts.pop_front();
            }
        }

        for alert in &raised {
            self.surface(alert);
        }

        raised
    }

    fn evaluate(&self, metrics: &QueryMetrics) -> Vec<PerformanceAlert> {
        let config = &self.config;
        let mut raised = Vec::new();
        let mut raise = |alert_type, severity, message: String, suggestion: &str| {
            raised.push(PerformanceAlert {
                alert_type,
                severity,
                message,
                suggestion: suggestion.to_string(),
                metrics: metrics.clone(),
                raised_at: Utc::now(),
            });
        };

        if metrics.execution_time_ms > config.slow_query_ms {
            let severity = if metrics.execution_time_ms > config.critical_query_ms {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            raise(
                AlertType::SlowQuery,
                severity,
                format!(
                    "query on '{}' took {} ms (threshold {} ms)",
                    metrics.collection, metrics.execution_time_ms, config.slow_query_ms
                ),
                "Add indexes for the filtered and sorted fields, or move $match stages earlier",
            );
        }

        if let Some(memory) = metrics.memory_usage_bytes {
            if memory > config.high_memory_bytes {
                raise(
                    AlertType::HighMemory,
                    AlertSeverity::Medium,
                    format!(
                        "query on '{}' used {} bytes (threshold {} bytes)",
                        metrics.collection, memory, config.high_memory_bytes
                    ),
                    "Project only the fields you need and limit the result before grouping",
                );
            }
        }

        if metrics.indexes_used.is_empty()
            && metrics.documents_examined > config.no_index_min_examined
        {
            raise(
                AlertType::NoIndexUsed,
                AlertSeverity::High,
                format!(
                    "query on '{}' examined {} documents without an index",
                    metrics.collection, metrics.documents_examined
                ),
                "Create an index covering the leading $match conditions",
            );
        }

        if metrics.documents_returned > config.large_result_threshold {
            raise(
                AlertType::LargeResultSet,
                AlertSeverity::Medium,
                format!(
                    "query on '{}' returned {} documents (threshold {})",
                    metrics.collection, metrics.documents_returned, config.large_result_threshold
                ),
                "Paginate the result with $skip/$limit or narrow the filter",
            );
        }

        raised
    }

    fn surface(&self, alert: &PerformanceAlert) {
        match alert.severity {
            AlertSeverity::High => {
                tracing::error!(
                    alert_type = %alert.alert_type,
                    collection = %alert.metrics.collection,
                    query_id = %alert.metrics.query_id,
                    execution_time_ms = alert.metrics.execution_time_ms,
                    suggestion = %alert.suggestion,
                    "{}",
                    alert.message
                );
                if let Some(handler) = &self.alert_handler {
                    handler(alert);
                }
            },
            AlertSeverity::Medium => tracing::warn!(
                alert_type = %alert.alert_type,
                collection = %alert.metrics.collection,
                query_id = %alert.metrics.query_id,
                "{}",
                alert.message
            ),
            AlertSeverity::Low => tracing::debug!(
                alert_type = %alert.alert_type,
                collection = %alert.metrics.collection,
                "{}",
                alert.message
            ),
        }
    }

    /// Aggregate statistics over the retained history
    pub fn stats(&self) -> PerformanceStats {
        let history = self.history.read();
        let total_queries = history.len();

        let average_execution_time_ms = if total_queries == 0 {
            0
        } else {
            let total: u64 = history.iter().map(|m| m.execution_time_ms).sum();
            (total as f64 / total_queries as f64).round() as u64
        };

        let slow_queries = history
            .iter()
            .filter(|m| m.execution_time_ms > self.config.slow_query_ms)
            .count();

        // Stable sort: equal durations keep insertion order.
        let mut slowest: Vec<QueryMetrics> = history.iter().cloned().collect();
        drop(history);
        slowest.sort_by(|a, b| b.execution_time_ms.cmp(&a.execution_time_ms));
        slowest.truncate(self.config.slowest_queries_reported);

        let mut alerts_by_type = BTreeMap::new();
        for alert in self.alerts.read().iter() {
            *alerts_by_type.entry(alert.alert_type).or_insert(0) += 1;
        }

        PerformanceStats {
            total_queries,
            average_execution_time_ms,
            slow_queries,
            alerts_by_type,
            slowest_queries: slowest,
        }
    }

    /// The last `limit` alerts, oldest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<PerformanceAlert> {
        let alerts = self.alerts.read();
        let skip = alerts.len().saturating_sub(limit);
        alerts.iter().skip(skip).cloned().collect()
    }

    /// The last `limit` executions, oldest first
    pub fn recent_metrics(&self, limit: usize) -> Vec<QueryMetrics> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Number of executions retained
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Per-collection counts and mean duration
    pub fn collection_stats(&self) -> BTreeMap<String, CollectionStats> {
        let mut totals: BTreeMap<String, (CollectionStats, u64)> = BTreeMap::new();
        for metrics in self.history.read().iter() {
            let (stats, total_ms) = totals.entry(metrics.collection.clone()).or_default();
            stats.queries += 1;
            if metrics.is_failure() {
                stats.failures += 1;
            }
            *total_ms += metrics.execution_time_ms;
        }

        totals
            .into_iter()
            .map(|(collection, (mut stats, total_ms))| {
                stats.average_execution_time_ms =
                    (total_ms as f64 / stats.queries as f64).round() as u64;
                (collection, stats)
            })
            .collect()
    }

    /// Pipeline improvement hints for `stages`
    pub fn suggest_optimizations(&self, stages: &[Stage]) -> Vec<String> {
        suggestions::suggest_optimizations(stages)
    }

    /// Drop all history and alerts
    pub fn clear(&self) {
        self.history.write().clear();
        self.alerts.write().clear();
        tracing::debug!("performance history cleared");
    }
}
