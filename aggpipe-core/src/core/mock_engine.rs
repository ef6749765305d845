//! Deterministic in-memory execution engine for offline testing
//!
//! [`MockEngine`] returns canned documents and statistics, records every
//! snapshot it receives, and can be told to fail the next N calls. It lets
//! the builder, the middleware and the monitor be exercised without a
//! database.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::traits::{AggregateOutput, ExecutionEngine, ExecutionStats, ExplainReport};
use crate::core::{AggPipeError, Result};
use crate::pipeline::{Document, PipelineSnapshot};

/// Canned-response execution engine.
#[derive(Debug, Default)]
pub struct MockEngine {
    documents: Vec<Document>,
    stats: ExecutionStats,
    latency: Option<Duration>,
    failures_remaining: AtomicUsize,
    calls: AtomicU64,
    requests: Mutex<Vec<PipelineSnapshot>>,
}

impl MockEngine {
    /// Engine returning no documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine returning `documents` on every call.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    /// Report these statistics with every result.
    pub fn stats(mut self, documents_examined: u64, indexes: &[&str]) -> Self {
        self.stats.documents_examined = documents_examined;
        self.stats.indexes_used = indexes.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        self
    }

    /// Report a memory figure with every result.
    pub fn memory_usage(mut self, bytes: u64) -> Self {
        self.stats.memory_usage_bytes = Some(bytes);
        self
    }

    /// Sleep this long before answering.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `count` calls with an engine error.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of `aggregate` calls received.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshots received so far, oldest first.
    pub fn requests(&self) -> Vec<PipelineSnapshot> {
        self.requests.lock().clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn aggregate(&self, request: &PipelineSnapshot) -> Result<AggregateOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.take_failure() {
            return Err(AggPipeError::Engine {
                engine: self.name().to_string(),
                message: format!("injected failure on collection '{}'", request.collection),
            });
        }

        Ok(AggregateOutput {
            documents: self.documents.clone(),
            stats: self.stats.clone(),
        })
    }

    async fn explain(&self, request: &PipelineSnapshot) -> Result<ExplainReport> {
        Ok(ExplainReport {
            documents_examined: self.stats.documents_examined,
            documents_returned: self.documents.len() as u64,
            indexes_used: self.stats.indexes_used.clone(),
            execution_time_ms: self.latency.map(|l| l.as_millis() as u64),
            raw: serde_json::json!({
                "collection": request.collection,
                "stages": request.stages,
            }),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
