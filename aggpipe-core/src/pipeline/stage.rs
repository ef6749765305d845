//! Stage model for aggregation pipelines.
//!
//! Stages are a tagged enum rather than a trait hierarchy: every consumer
//! (optimizer, validator, suggestion scan, key generation) pattern-matches on
//! the stage kind. Each variant serializes to the engine-native shape, e.g.
//! `{"$match": {...}}`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// A JSON document. Stage payloads are expected to be JSON objects.
pub type Document = serde_json::Value;

/// One step of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stage {
    /// Filter documents
    #[serde(rename = "$match")]
    Match(Document),
    /// Join documents from another collection
    #[serde(rename = "$lookup")]
    Lookup(LookupSpec),
    /// Group documents by `_id` with accumulators
    #[serde(rename = "$group")]
    Group(Document),
    /// Reshape documents
    #[serde(rename = "$project")]
    Project(Document),
    /// Order documents
    #[serde(rename = "$sort")]
    Sort(SortSpec),
    /// Keep at most `n` documents
    #[serde(rename = "$limit")]
    Limit(u64),
    /// Drop the first `n` documents
    #[serde(rename = "$skip")]
    Skip(u64),
    /// Expand an array field into one document per element
    #[serde(rename = "$unwind")]
    Unwind(UnwindSpec),
    /// Add computed fields
    #[serde(rename = "$addFields")]
    AddFields(Document),
    /// Run several sub-pipelines over the same input
    #[serde(rename = "$facet")]
    Facet(IndexMap<String, Vec<Stage>>),
}

/// Fieldless discriminant of [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StageKind {
    /// `$match`
    Match,
    /// `$lookup`
    Lookup,
    /// `$group`
    Group,
    /// `$project`
    Project,
    /// `$sort`
    Sort,
    /// `$limit`
    Limit,
    /// `$skip`
    Skip,
    /// `$unwind`
    Unwind,
    /// `$addFields`
    AddFields,
    /// `$facet`
    Facet,
}

impl StageKind {
    /// Engine-native operator name.
    pub fn operator(&self) -> &'static str {
        match self {
            StageKind::Match => "$match",
            StageKind::Lookup => "$lookup",
            StageKind::Group => "$group",
            StageKind::Project => "$project",
            StageKind::Sort => "$sort",
            StageKind::Limit => "$limit",
            StageKind::Skip => "$skip",
            StageKind::Unwind => "$unwind",
            StageKind::AddFields => "$addFields",
            StageKind::Facet => "$facet",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

impl Stage {
    /// The kind of this stage.
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Match(_) => StageKind::Match,
            Stage::Lookup(_) => StageKind::Lookup,
            Stage::Group(_) => StageKind::Group,
            Stage::Project(_) => StageKind::Project,
            Stage::Sort(_) => StageKind::Sort,
            Stage::Limit(_) => StageKind::Limit,
            Stage::Skip(_) => StageKind::Skip,
            Stage::Unwind(_) => StageKind::Unwind,
            Stage::AddFields(_) => StageKind::AddFields,
            Stage::Facet(_) => StageKind::Facet,
        }
    }

    /// Engine-native JSON form of this stage.
    pub fn to_document(&self) -> Document {
        // Serialization of these types cannot fail: all map keys are strings.
        serde_json::to_value(self).unwrap_or(Document::Null)
    }
}

/// Payload of a `$lookup` stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupSpec {
    /// Source collection name
    pub from: String,
    /// Key path on the input documents
    pub local_field: String,
    /// Key path on the source collection
    pub foreign_field: String,
    /// Output array field
    #[serde(rename = "as")]
    pub as_field: String,
    /// Optional sub-pipeline run against the joined documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<Stage>>,
}

impl LookupSpec {
    /// Equality join from `from` on `local_field == foreign_field` into `as_field`.
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
            pipeline: None,
        }
    }

    /// Attach a sub-pipeline.
    pub fn with_pipeline(mut self, pipeline: Vec<Stage>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Ascending (`1`)
    Ascending,
    /// Descending (`-1`)
    Descending,
}

impl Serialize for SortOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SortOrder::Ascending => serializer.serialize_i32(1),
            SortOrder::Descending => serializer.serialize_i32(-1),
        }
    }
}

/// Ordered sort keys. Insertion order is the sort precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SortSpec(pub IndexMap<String, SortOrder>);

impl SortSpec {
    /// Sort with no keys yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ascending key.
    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), SortOrder::Ascending);
        self
    }

    /// Append a descending key.
    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), SortOrder::Descending);
        self
    }

    /// Number of sort keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no keys are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Payload of an `$unwind` stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwindSpec {
    /// Field path, always `$`-prefixed
    pub path: String,
    /// Keep documents whose array is missing, null or empty
    pub preserve_null_and_empty_arrays: bool,
}

impl UnwindSpec {
    /// Unwind `path`, dropping documents without elements.
    ///
    /// A missing `$` prefix is added.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('$') {
            path
        } else {
            format!("${path}")
        };
        Self {
            path,
            preserve_null_and_empty_arrays: false,
        }
    }

    /// Keep documents whose array is missing or empty.
    pub fn preserve_empty(mut self) -> Self {
        self.preserve_null_and_empty_arrays = true;
        self
    }

    /// Field path without the `$` prefix.
    pub fn field(&self) -> &str {
        self.path.trim_start_matches('$')
    }
}
