//! Fluent construction and execution of aggregation pipelines.
//!
//! A [`PipelineBuilder`] accumulates stages and execution options for one
//! collection. Execution hands an owned [`PipelineSnapshot`] to an
//! [`ExecutionEngine`] and, when a monitor is attached, records the
//! measurements of every run, failed ones included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use super::optimizer::{optimize_stages, validate_stages, ValidationReport};
use super::options::{Collation, ExecutionOptions, IndexHint, PipelineSnapshot};
use super::stage::{Document, LookupSpec, SortSpec, Stage, UnwindSpec};
use crate::caching::{CacheKeyGenerator, CacheStore};
use crate::core::traits::{ExecutionEngine, ExecutionStats, ExplainReport};
use crate::core::{ErrorContext, Result};
use crate::monitoring::{PerformanceMonitor, QueryMetrics};

/// Builds an aggregation pipeline for one collection.
///
/// Cloning copies stages and options; an attached monitor is shared.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    collection: String,
    stages: Vec<Stage>,
    options: ExecutionOptions,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl PipelineBuilder {
    /// Start an empty pipeline on `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            stages: Vec::new(),
            options: ExecutionOptions::default(),
            monitor: None,
        }
    }

    /// Record executions with `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Append a pre-built stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a `$match` stage.
    pub fn filter(self, conditions: Document) -> Self {
        self.stage(Stage::Match(conditions))
    }

    /// Append a `$lookup` stage.
    pub fn lookup(self, spec: LookupSpec) -> Self {
        self.stage(Stage::Lookup(spec))
    }

    /// Append a `$group` stage.
    pub fn group(self, spec: Document) -> Self {
        self.stage(Stage::Group(spec))
    }

    /// Append a `$project` stage.
    pub fn project(self, spec: Document) -> Self {
        self.stage(Stage::Project(spec))
    }

    /// Append a `$sort` stage.
    pub fn sort(self, spec: SortSpec) -> Self {
        self.stage(Stage::Sort(spec))
    }

    /// Append a `$limit` stage.
    pub fn limit(self, n: u64) -> Self {
        self.stage(Stage::Limit(n))
    }

    /// Append a `$skip` stage.
    pub fn skip(self, n: u64) -> Self {
        self.stage(Stage::Skip(n))
    }

    /// Append an `$unwind` stage for `path`.
    pub fn unwind(self, path: impl Into<String>) -> Self {
        self.stage(Stage::Unwind(UnwindSpec::new(path)))
    }

    /// Append an `$unwind` stage with explicit options.
    pub fn unwind_with(self, spec: UnwindSpec) -> Self {
        self.stage(Stage::Unwind(spec))
    }

    /// Append an `$addFields` stage.
    pub fn add_fields(self, spec: Document) -> Self {
        self.stage(Stage::AddFields(spec))
    }

    /// Append a `$facet` stage.
    pub fn facet(self, facets: IndexMap<String, Vec<Stage>>) -> Self {
        self.stage(Stage::Facet(facets))
    }

    /// Merge `options` into the current options; set fields win.
    pub fn set_options(mut self, options: ExecutionOptions) -> Self {
        self.options.merge(options);
        self
    }

    /// Set the index hint.
    pub fn hint(mut self, hint: IndexHint) -> Self {
        self.options.hint = Some(hint);
        self
    }

    /// Set the execution time budget enforced by the engine.
    pub fn max_time(mut self, max_time: Duration) -> Self {
        self.options.max_time = Some(max_time);
        self
    }

    /// Allow or forbid spilling to disk.
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.options.allow_disk_use = Some(allow);
        self
    }

    /// Set the collation.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// Attach a diagnostic comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Target collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Current execution options.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stage has been added.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Owned copy of the pipeline for the engine.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            collection: self.collection.clone(),
            stages: self.stages.clone(),
            options: self.options.clone(),
        }
    }

    /// Engine-native JSON array of the stages.
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }

    /// Stage operators joined with arrows, for logs.
    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.kind().operator())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Move `$match` stages as early as their field dependencies allow.
    pub fn optimize(mut self) -> Self {
        self.stages = optimize_stages(std::mem::take(&mut self.stages));
        tracing::debug!(
            collection = %self.collection,
            pipeline = %self.summary(),
            "pipeline optimized"
        );
        self
    }

    /// Structural errors and performance warnings.
    pub fn validate(&self) -> ValidationReport {
        validate_stages(&self.stages)
    }

    /// Run the pipeline.
    ///
    /// Engine errors are returned unchanged after being logged and recorded.
    /// Argument and configuration errors raised by the engine are prefixed
    /// with the collection and stage summary.
    pub async fn execute(&self, engine: &dyn ExecutionEngine) -> Result<Vec<Document>> {
        let snapshot = self.snapshot();
        let start = Instant::now();

        let outcome = engine
            .aggregate(&snapshot)
            .await
            .with_context_lazy(|| format!("{} pipeline [{}]", self.collection, self.summary()));

        match outcome {
            Ok(output) => {
                let elapsed = start.elapsed();
                tracing::debug!(
                    collection = %snapshot.collection,
                    engine = engine.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    returned = output.documents.len(),
                    "pipeline executed"
                );
                self.record(snapshot, elapsed, output.documents.len(), output.stats, None);
                Ok(output.documents)
            },
            Err(e) => {
                let elapsed = start.elapsed();
                tracing::error!(
                    collection = %snapshot.collection,
                    engine = engine.name(),
                    pipeline = %self.summary(),
                    options = %serde_json::to_string(&snapshot.options).unwrap_or_default(),
                    error = %e,
                    category = e.category(),
                    severity = ?e.severity(),
                    "pipeline execution failed"
                );
                self.record(
                    snapshot,
                    elapsed,
                    0,
                    ExecutionStats::default(),
                    Some(e.to_string()),
                );
                Err(e)
            },
        }
    }

    /// Run the pipeline, memoizing the result in `store`.
    ///
    /// The key covers the collection, the stages in order and the options.
    /// `ttl` of `None` uses the store default.
    pub async fn execute_cached(
        &self,
        engine: &dyn ExecutionEngine,
        store: &CacheStore,
        ttl: Option<Duration>,
    ) -> Result<Vec<Document>> {
        let key = CacheKeyGenerator::pipeline_key(&self.collection, &self.stages, &self.options)?;

        match store.get(&key) {
            Some(Document::Array(documents)) => return Ok(documents),
            Some(_) => {
                tracing::warn!(key = %key, "discarding cached pipeline result of unexpected shape");
                store.delete(&key);
            },
            None => {},
        }

        let documents = self.execute(engine).await?;
        store.set(key, Document::Array(documents.clone()), ttl);
        Ok(documents)
    }

    /// Engine-native diagnostics for the pipeline.
    pub async fn explain(&self, engine: &dyn ExecutionEngine) -> Result<ExplainReport> {
        engine.explain(&self.snapshot()).await
    }

    fn record(
        &self,
        snapshot: PipelineSnapshot,
        elapsed: Duration,
        returned: usize,
        stats: ExecutionStats,
        error: Option<String>,
    ) {
        let Some(monitor) = &self.monitor else {
            return;
        };

        monitor.record_metrics(QueryMetrics {
            execution_time_ms: elapsed.as_millis() as u64,
            documents_examined: stats.documents_examined,
            documents_returned: returned as u64,
            indexes_used: stats.indexes_used,
            memory_usage_bytes: stats.memory_usage_bytes,
            error,
            ..QueryMetrics::new(snapshot.collection, snapshot.stages)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AggPipeError, MockEngine};
    use serde_json::json;

    fn tasks() -> PipelineBuilder {
        PipelineBuilder::new("tasks")
            .filter(json!({ "status": "open" }))
            .sort(SortSpec::new().desc("createdAt"))
            .limit(20)
    }

    #[test]
    fn test_fluent_construction() {
        let builder = tasks();
        assert_eq!(builder.collection(), "tasks");
        assert_eq!(builder.len(), 3);
        assert_eq!(builder.summary(), "$match -> $sort -> $limit");
        assert_eq!(
            builder.to_documents(),
            vec![
                json!({ "$match": { "status": "open" } }),
                json!({ "$sort": { "createdAt": -1 } }),
                json!({ "$limit": 20 }),
            ]
        );
    }

    #[test]
    fn test_add_fields_stage() {
        let builder = tasks().add_fields(json!({ "overdue": { "$lt": ["$dueDate", "$$NOW"] } }));
        assert_eq!(builder.summary(), "$match -> $sort -> $limit -> $addFields");
        assert_eq!(
            builder.to_documents()[3],
            json!({ "$addFields": { "overdue": { "$lt": ["$dueDate", "$$NOW"] } } })
        );
    }

    #[tokio::test]
    async fn test_memory_figure_reaches_monitor() {
        use crate::core::AggregateOutput;
        use crate::monitoring::AlertType;

        let monitor = Arc::new(PerformanceMonitor::default());
        let engine = MockEngine::new().stats(0, &["status_1"]).memory_usage(200 * 1024 * 1024);
        tasks().with_monitor(monitor.clone()).execute(&engine).await.unwrap();

        let alerts = monitor.recent_alerts(5);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::HighMemory);

        let output = AggregateOutput::from_documents(vec![json!({ "_id": 1 })]);
        assert_eq!(output.stats.documents_examined, 0);
        assert!(output.stats.memory_usage_bytes.is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let base = tasks();
        let extended = base.clone().skip(40);
        assert_eq!(base.len(), 3);
        assert_eq!(extended.len(), 4);
    }

    #[test]
    fn test_options_merge() {
        let builder = PipelineBuilder::new("tasks")
            .allow_disk_use(true)
            .comment("first")
            .set_options(ExecutionOptions {
                comment: Some("second".to_string()),
                max_time: Some(Duration::from_secs(2)),
                ..Default::default()
            });

        let options = builder.options();
        assert_eq!(options.allow_disk_use, Some(true));
        assert_eq!(options.comment.as_deref(), Some("second"));
        assert_eq!(options.max_time, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_optimize_through_builder() {
        let builder = PipelineBuilder::new("tasks")
            .lookup(LookupSpec::new("users", "ownerId", "_id", "owner"))
            .filter(json!({ "status": "open" }))
            .optimize();
        assert_eq!(builder.summary(), "$match -> $lookup");
    }

    #[tokio::test]
    async fn test_execute_forwards_snapshot_and_records() {
        let monitor = Arc::new(PerformanceMonitor::default());
        let engine = MockEngine::with_documents(vec![json!({ "_id": 1 })]).stats(1, &["status_1"]);
        let builder = tasks().max_time(Duration::from_millis(500)).with_monitor(monitor.clone());

        let documents = builder.execute(&engine).await.unwrap();
        assert_eq!(documents.len(), 1);

        let requests = engine.requests();
        let request = &requests[0];
        assert_eq!(request.stages, builder.stages());
        assert_eq!(request.options.max_time, Some(Duration::from_millis(500)));

        let recorded = monitor.recent_metrics(1);
        assert_eq!(recorded[0].documents_returned, 1);
        assert_eq!(recorded[0].documents_examined, 1);
        assert!(recorded[0].error.is_none());
    }

    #[tokio::test]
    async fn test_execute_failure_is_verbatim_and_recorded() {
        let monitor = Arc::new(PerformanceMonitor::default());
        let engine = MockEngine::new();
        engine.fail_next(1);

        let result = tasks().with_monitor(monitor.clone()).execute(&engine).await;
        match result {
            Err(AggPipeError::Engine { engine, message }) => {
                assert_eq!(engine, "mock");
                assert!(message.contains("tasks"));
            },
            other => panic!("expected engine error, got {other:?}"),
        }
        assert!(monitor.recent_metrics(1)[0].is_failure());
    }

    #[tokio::test]
    async fn test_engine_argument_errors_gain_pipeline_context() {
        use crate::core::{AggregateOutput, ExecutionEngine};
        use async_trait::async_trait;

        struct RejectingEngine;

        #[async_trait]
        impl ExecutionEngine for RejectingEngine {
            async fn aggregate(&self, _request: &PipelineSnapshot) -> Result<AggregateOutput> {
                Err(AggPipeError::InvalidArgument {
                    message: "unknown operator".to_string(),
                })
            }

            fn name(&self) -> &str {
                "rejecting"
            }
        }

        let err = tasks().execute(&RejectingEngine).await.unwrap_err();
        match err {
            AggPipeError::InvalidArgument { message } => assert_eq!(
                message,
                "tasks pipeline [$match -> $sort -> $limit]: unknown operator"
            ),
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_cached_runs_engine_once() {
        let store = CacheStore::default();
        let engine = MockEngine::with_documents(vec![json!({ "_id": 1 })]);
        let builder = tasks();

        let first = builder.execute_cached(&engine, &store, None).await.unwrap();
        let second = builder.execute_cached(&engine, &store, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.calls(), 1);

        builder.clone().skip(1).execute_cached(&engine, &store, None).await.unwrap();
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_explain_uses_engine() {
        let engine = MockEngine::new().stats(42, &[]);
        let report = tasks().explain(&engine).await.unwrap();
        assert_eq!(report.documents_examined, 42);
    }
}
