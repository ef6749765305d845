//! Records produced by the performance monitor.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::Stage;

/// Measurements for one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetrics {
    /// Unique id of the execution
    pub query_id: Uuid,
    /// Wall-clock duration in milliseconds
    pub execution_time_ms: u64,
    /// Documents scanned, as reported by the engine
    pub documents_examined: u64,
    /// Documents in the result
    pub documents_returned: u64,
    /// Indexes the engine used
    pub indexes_used: BTreeSet<String>,
    /// Memory used, when the engine reports it
    pub memory_usage_bytes: Option<u64>,
    /// Stages that were executed
    pub pipeline: Vec<Stage>,
    /// Target collection
    pub collection: String,
    /// When the execution finished
    pub timestamp: DateTime<Utc>,
    /// Error message for failed executions
    pub error: Option<String>,
}

impl QueryMetrics {
    /// Empty measurements for a pipeline on `collection`.
    pub fn new(collection: impl Into<String>, pipeline: Vec<Stage>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            execution_time_ms: 0,
            documents_examined: 0,
            documents_returned: 0,
            indexes_used: BTreeSet::new(),
            memory_usage_bytes: None,
            pipeline,
            collection: collection.into(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Whether the execution failed.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Rule that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AlertType {
    /// Execution took too long
    SlowQuery,
    /// Execution used too much memory
    HighMemory,
    /// Many documents scanned without an index
    NoIndexUsed,
    /// Result set is very large
    LargeResultSet,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertType::SlowQuery => "slow_query",
            AlertType::HighMemory => "high_memory",
            AlertType::NoIndexUsed => "no_index_used",
            AlertType::LargeResultSet => "large_result_set",
        };
        f.write_str(name)
    }
}

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AlertSeverity {
    /// Informational
    Low,
    /// Worth a look
    Medium,
    /// Needs attention now
    High,
}

/// A rule violation found in one execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    /// Rule that fired
    pub alert_type: AlertType,
    /// Urgency
    pub severity: AlertSeverity,
    /// What happened
    pub message: String,
    /// What to do about it
    pub suggestion: String,
    /// The measurements that triggered the alert
    pub metrics: QueryMetrics,
    /// When the alert was raised
    pub raised_at: DateTime<Utc>,
}

/// Aggregate view over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Executions in the history
    pub total_queries: usize,
    /// Mean execution time, rounded to whole milliseconds
    pub average_execution_time_ms: u64,
    /// Executions over the slow-query threshold
    pub slow_queries: usize,
    /// Alert counts per rule
    pub alerts_by_type: std::collections::BTreeMap<AlertType, usize>,
    /// Slowest executions, slowest first
    pub slowest_queries: Vec<QueryMetrics>,
}

/// Per-collection summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    /// Executions against the collection
    pub queries: usize,
    /// Failed executions
    pub failures: usize,
    /// Mean execution time, rounded to whole milliseconds
    pub average_execution_time_ms: u64,
}
