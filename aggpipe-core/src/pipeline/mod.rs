//! Aggregation pipeline construction.
//!
//! A pipeline is an ordered list of typed [`Stage`]s plus
//! [`ExecutionOptions`], assembled with the fluent [`PipelineBuilder`].
//!
//! ```
//! use aggpipe_core::pipeline::{LookupSpec, PipelineBuilder, SortSpec};
//! use serde_json::json;
//!
//! let pipeline = PipelineBuilder::new("tasks")
//!     .lookup(LookupSpec::new("users", "ownerId", "_id", "owner"))
//!     .filter(json!({ "status": "open" }))
//!     .sort(SortSpec::new().desc("createdAt"))
//!     .limit(20)
//!     .optimize();
//!
//! assert_eq!(pipeline.summary(), "$match -> $lookup -> $sort -> $limit");
//! assert!(pipeline.validate().is_valid);
//! ```

pub mod builder;
pub mod optimizer;
pub mod options;
pub mod stage;

pub use builder::PipelineBuilder;
pub use optimizer::{optimize_stages, validate_stages, ValidationReport};
pub use options::{Collation, ExecutionOptions, IndexHint, PipelineSnapshot};
pub use stage::{Document, LookupSpec, SortOrder, SortSpec, Stage, StageKind, UnwindSpec};
