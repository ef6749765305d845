//! # aggpipe core
//!
//! Aggregation pipeline construction with result caching and query
//! performance observability.
//!
//! This crate provides:
//! - A fluent, typed builder for document-database aggregation pipelines
//! - Dependency-aware `$match` hoisting and structural validation
//! - A process-local TTL cache with deterministic keys and a background sweep
//! - Composable wrappers adding caching, invalidation and timing to async calls
//! - A performance monitor with threshold alerts and pipeline hints
//!
//! The database itself stays outside: pipelines run through any
//! [`ExecutionEngine`] implementation.
//!
//! ## Feature Flags
//!
//! - `toml-support` (default): load configuration from TOML files
//!
//! ## Quick Start
//!
//! ```rust
//! use aggpipe_core::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> aggpipe_core::Result<()> {
//! let services = QueryServices::start(AggPipeConfig::default())?;
//! let engine = MockEngine::with_documents(vec![json!({ "_id": 1, "status": "open" })]);
//!
//! let open = services
//!     .builder("tasks")
//!     .filter(json!({ "status": "open" }))
//!     .sort(SortSpec::new().desc("createdAt"))
//!     .paginate(1, 20)?
//!     .execute_cached(&engine, &services.store(), None)
//!     .await?;
//! assert_eq!(open.len(), 1);
//!
//! services.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// ================================
// MODULE DECLARATIONS
// ================================

/// Result caching: store, keys and operation wrappers
pub mod caching;
/// Configuration management and loading
pub mod config;
/// Core traits and types
pub mod core;
/// Tracing subscriber setup
pub mod logging;
/// Query performance monitoring
pub mod monitoring;
/// Pipeline stages, options and builder
pub mod pipeline;
/// Query shortcuts built on the pipeline builder
pub mod query;
/// Shared service lifecycle
pub mod services;

// ================================
// PUBLIC API EXPORTS
// ================================

/// Prelude module containing the most commonly used types
pub mod prelude {
    pub use crate::caching::{
        operation, CacheStore, InvalidationKeys, MethodCacheOptions, Operation, OperationExt,
    };
    pub use crate::config::AggPipeConfig;
    pub use crate::core::{AggPipeError, ExecutionEngine, MockEngine, ObjectId, Result};
    pub use crate::monitoring::PerformanceMonitor;
    pub use crate::pipeline::{LookupSpec, PipelineBuilder, SortSpec, Stage, UnwindSpec};
    pub use crate::query::QueryHelpersExt;
    pub use crate::services::QueryServices;
}

// Re-export core types
pub use crate::config::{AggPipeConfig, MonitorConfig};
pub use crate::core::{
    AggPipeError, AggregateOutput, ErrorContext, ErrorSeverity, ExecutionEngine, ExecutionStats,
    ExplainReport, MockEngine, ObjectId, Result,
};
pub use crate::pipeline::{Document, PipelineBuilder, PipelineSnapshot, Stage};
pub use crate::services::QueryServices;
