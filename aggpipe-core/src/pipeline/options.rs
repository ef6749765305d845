//! Execution options forwarded to the engine alongside the stage sequence.

use std::time::Duration;

use serde::{Serialize, Serializer};

use super::stage::{Document, Stage};

/// Index hint: by index name or by key pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndexHint {
    /// Index name, e.g. `"status_1_createdAt_-1"`
    Name(String),
    /// Key pattern, e.g. `{"status": 1}`
    Keys(Document),
}

/// String comparison rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collation {
    /// ICU locale, e.g. `"en"`
    pub locale: String,
    /// Comparison strength (1-5)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<u8>,
    /// Include case comparison at strength 1 or 2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_level: Option<bool>,
    /// Compare numeric strings as numbers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_ordering: Option<bool>,
}

impl Collation {
    /// Collation for `locale` with engine defaults.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            strength: None,
            case_level: None,
            numeric_ordering: None,
        }
    }

    /// Set comparison strength.
    pub fn strength(mut self, strength: u8) -> Self {
        self.strength = Some(strength);
        self
    }
}

/// Options applied when the pipeline is executed.
///
/// Unset options are omitted from the serialized form so that they do not
/// influence cache keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    /// Allow the engine to spill to disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_disk_use: Option<bool>,
    /// Execution time budget, enforced by the engine
    #[serde(
        rename = "maxTimeMS",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_millis"
    )]
    pub max_time: Option<Duration>,
    /// Index hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<IndexHint>,
    /// Collation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<Collation>,
    /// Diagnostic comment attached to the query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn serialize_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
        None => serializer.serialize_none(),
    }
}

impl ExecutionOptions {
    /// Merge `other` into `self`; options set in `other` win.
    pub fn merge(&mut self, other: ExecutionOptions) {
        if other.allow_disk_use.is_some() {
            self.allow_disk_use = other.allow_disk_use;
        }
        if other.max_time.is_some() {
            self.max_time = other.max_time;
        }
        if other.hint.is_some() {
            self.hint = other.hint;
        }
        if other.collation.is_some() {
            self.collation = other.collation;
        }
        if other.comment.is_some() {
            self.comment = other.comment;
        }
    }

    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        self == &ExecutionOptions::default()
    }
}

/// Owned copy of a pipeline handed to the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    /// Target collection
    pub collection: String,
    /// Stage sequence
    pub stages: Vec<Stage>,
    /// Execution options
    pub options: ExecutionOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_options_are_omitted() {
        let options = ExecutionOptions::default();
        assert!(options.is_empty());
        assert_eq!(serde_json::to_value(&options).unwrap(), json!({}));
    }

    #[test]
    fn test_options_serialize_engine_names() {
        let options = ExecutionOptions {
            allow_disk_use: Some(true),
            max_time: Some(Duration::from_secs(2)),
            hint: Some(IndexHint::Name("status_1".to_string())),
            collation: Some(Collation::new("en").strength(2)),
            comment: Some("dashboard".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({
                "allowDiskUse": true,
                "maxTimeMS": 2000,
                "hint": "status_1",
                "collation": { "locale": "en", "strength": 2 },
                "comment": "dashboard"
            })
        );
    }

    #[test]
    fn test_merge_overrides_only_set_fields() {
        let mut base = ExecutionOptions {
            allow_disk_use: Some(false),
            comment: Some("base".to_string()),
            ..Default::default()
        };
        base.merge(ExecutionOptions {
            allow_disk_use: Some(true),
            hint: Some(IndexHint::Keys(json!({ "createdAt": -1 }))),
            ..Default::default()
        });

        assert_eq!(base.allow_disk_use, Some(true));
        assert_eq!(base.comment.as_deref(), Some("base"));
        assert!(base.hint.is_some());
    }
}
