//! Core traits for the external collaborators of the aggregation layer
//!
//! The builder and the monitor depend only on the narrow contract defined
//! here, never on a particular storage engine's full API.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{AggPipeError, Result};
use crate::pipeline::{Document, PipelineSnapshot};

/// Statistics reported by the engine for one execution.
///
/// These figures come from the engine; this crate never computes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    /// Documents scanned to produce the result
    pub documents_examined: u64,
    /// Indexes the engine used
    pub indexes_used: BTreeSet<String>,
    /// Peak memory used by the execution, when the engine reports it
    pub memory_usage_bytes: Option<u64>,
}

/// Result of running a pipeline.
#[derive(Debug, Clone, Default)]
pub struct AggregateOutput {
    /// Result documents
    pub documents: Vec<Document>,
    /// Engine-supplied execution statistics
    pub stats: ExecutionStats,
}

impl AggregateOutput {
    /// Output with the given documents and empty statistics.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            stats: ExecutionStats::default(),
        }
    }
}

/// Engine-native diagnostics for a pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExplainReport {
    /// Documents the plan would examine
    pub documents_examined: u64,
    /// Documents the plan would return
    pub documents_returned: u64,
    /// Indexes selected by the planner
    pub indexes_used: BTreeSet<String>,
    /// Engine-measured execution time in milliseconds
    pub execution_time_ms: Option<u64>,
    /// Raw engine output
    pub raw: Document,
}

/// Executes aggregation pipelines.
///
/// Implementations apply every option in the snapshot; the time budget in
/// `options.max_time` is enforced by the engine, not by callers. Errors should
/// be reported as [`AggPipeError::Engine`] and are propagated verbatim.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run the pipeline and return its documents with execution statistics.
    async fn aggregate(&self, request: &PipelineSnapshot) -> Result<AggregateOutput>;

    /// Return engine-native execution statistics for the pipeline.
    async fn explain(&self, _request: &PipelineSnapshot) -> Result<ExplainReport> {
        Err(AggPipeError::Unsupported {
            operation: "explain".to_string(),
            reason: format!("engine '{}' does not provide explain output", self.name()),
        })
    }

    /// Engine name used in logs and errors.
    fn name(&self) -> &str;
}
