//! Core data structures and abstractions
//!
//! This module contains the error type, the execution-engine contract,
//! structured identifiers and a deterministic mock engine.

pub mod error;
pub mod ids;
pub mod mock_engine;
pub mod traits;

// Re-export key items for convenience
pub use error::{AggPipeError, ErrorContext, ErrorSeverity, Result};
pub use ids::ObjectId;
pub use mock_engine::MockEngine;
pub use traits::{AggregateOutput, ExecutionEngine, ExecutionStats, ExplainReport};
