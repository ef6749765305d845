//! Query performance monitoring
//!
//! This module records per-execution metrics, raises threshold alerts and
//! derives static improvement hints for pipelines:
//! - Bounded rolling history of executions
//! - Slow query, memory, index and result-size alerts
//! - Aggregate and per-collection statistics

/// Rolling history and alert rules
pub mod monitor;
/// Static pipeline hints
pub mod suggestions;
/// Metric and alert records
pub mod types;

pub use monitor::{AlertHandler, PerformanceMonitor};
pub use suggestions::suggest_optimizations;
pub use types::{
    AlertSeverity, AlertType, CollectionStats, PerformanceAlert, PerformanceStats, QueryMetrics,
};
