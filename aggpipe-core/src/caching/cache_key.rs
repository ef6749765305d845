//! Deterministic cache key generation
//!
//! Keys are derived from a canonical JSON rendering (object keys sorted
//! recursively, array order kept) hashed with SHA-256. Stage order is part of
//! the array order, so reordered pipelines never share a key. Objects whose key
//! order is meaningful (`$sort` precedence, compound index hints) are kept as
//! written.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{CacheError, CacheResult};
use crate::pipeline::{ExecutionOptions, Stage};

/// Prefix shared by all pipeline result keys.
pub const PIPELINE_KEY_PREFIX: &str = "pipeline:";

/// Object keys whose value is order-sensitive and must not be canonicalized.
const ORDERED_KEYS: &[&str] = &["$sort", "hint"];

/// Pure functions deriving cache keys.
pub struct CacheKeyGenerator;

impl CacheKeyGenerator {
    /// Key for the result of running `stages` with `options` on `collection`.
    ///
    /// Format: `pipeline:<collection>:<sha256>`.
    pub fn pipeline_key(
        collection: &str,
        stages: &[Stage],
        options: &ExecutionOptions,
    ) -> CacheResult<String> {
        let payload = serde_json::json!({
            "pipeline": serde_json::to_value(stages)
                .map_err(|e| CacheError::KeyGenerationFailed(e.to_string()))?,
            "options": serde_json::to_value(options)
                .map_err(|e| CacheError::KeyGenerationFailed(e.to_string()))?,
        });
        Ok(format!(
            "{PIPELINE_KEY_PREFIX}{collection}:{}",
            Self::digest(&payload)
        ))
    }

    /// Key for a method call: `<owner>.<name>:<sha256>`.
    ///
    /// The digest covers the owner and name as separate fields as well as the
    /// arguments, so identities that render to the same prefix never collide.
    /// Fails when the arguments cannot be represented as JSON, e.g. a map with
    /// non-string keys.
    pub fn method_key<A>(owner: &str, name: &str, args: &A) -> CacheResult<String>
    where
        A: Serialize + ?Sized,
    {
        let args = serde_json::to_value(args).map_err(|e| {
            CacheError::KeyGenerationFailed(format!("arguments of {owner}.{name}: {e}"))
        })?;
        let payload = serde_json::json!({ "owner": owner, "name": name, "args": args });
        Ok(format!("{owner}.{name}:{}", Self::digest(&payload)))
    }

    /// Recursively canonicalize JSON (sort object keys).
    ///
    /// Values under `$sort` and `hint` keep their key order: it is the sort
    /// precedence or the compound index definition.
    pub fn canonicalize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();

                let mut sorted = serde_json::Map::new();
                for key in keys {
                    if let Some(val) = map.get(key) {
                        let val = if ORDERED_KEYS.contains(&key.as_str()) {
                            Self::canonicalize_ordered(val)
                        } else {
                            Self::canonicalize_json(val)
                        };
                        sorted.insert(key.to_string(), val);
                    }
                }
                Value::Object(sorted)
            },
            Value::Array(arr) => Value::Array(arr.iter().map(Self::canonicalize_json).collect()),
            other => other.clone(),
        }
    }

    /// Render an order-sensitive object as an array of `[key, value]` pairs.
    fn canonicalize_ordered(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Array(
                map.iter()
                    .map(|(key, val)| {
                        Value::Array(vec![Value::String(key.clone()), Self::canonicalize_json(val)])
                    })
                    .collect(),
            ),
            other => Self::canonicalize_json(other),
        }
    }

    fn digest(value: &Value) -> String {
        let canonical = Self::canonicalize_json(value).to_string();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{IndexHint, LookupSpec, SortSpec};
    use serde_json::json;
    use std::collections::HashMap;

    fn match_stage() -> Stage {
        Stage::Match(json!({ "status": "open", "priority": { "$gte": 2 } }))
    }

    fn sort_stage() -> Stage {
        Stage::Sort(SortSpec::new().desc("createdAt"))
    }

    #[test]
    fn test_identical_pipelines_share_a_key() {
        let options = ExecutionOptions::default();
        let k1 = CacheKeyGenerator::pipeline_key("tasks", &[match_stage(), sort_stage()], &options)
            .unwrap();
        let k2 = CacheKeyGenerator::pipeline_key("tasks", &[match_stage(), sort_stage()], &options)
            .unwrap();
        assert_eq!(k1, k2);
        assert!(k1.starts_with("pipeline:tasks:"));
    }

    #[test]
    fn test_stage_order_changes_the_key() {
        let options = ExecutionOptions::default();
        let k1 = CacheKeyGenerator::pipeline_key("tasks", &[match_stage(), sort_stage()], &options)
            .unwrap();
        let k3 = CacheKeyGenerator::pipeline_key("tasks", &[sort_stage(), match_stage()], &options)
            .unwrap();
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_object_key_order_does_not_change_the_key() {
        let options = ExecutionOptions::default();
        let a = Stage::Match(json!({ "a": 1, "b": 2 }));
        let b = Stage::Match(json!({ "b": 2, "a": 1 }));
        assert_eq!(
            CacheKeyGenerator::pipeline_key("c", &[a], &options).unwrap(),
            CacheKeyGenerator::pipeline_key("c", &[b], &options).unwrap()
        );
    }

    #[test]
    fn test_options_and_collection_are_part_of_the_key() {
        let stages = [match_stage()];
        let plain = ExecutionOptions::default();
        let with_comment = ExecutionOptions {
            comment: Some("report".to_string()),
            ..Default::default()
        };
        let base = CacheKeyGenerator::pipeline_key("tasks", &stages, &plain).unwrap();
        assert_ne!(base, CacheKeyGenerator::pipeline_key("tasks", &stages, &with_comment).unwrap());
        assert_ne!(base, CacheKeyGenerator::pipeline_key("projects", &stages, &plain).unwrap());
    }

    #[test]
    fn test_method_key_is_deterministic_and_argument_sensitive() {
        let k1 = CacheKeyGenerator::method_key("TaskService", "find_open", &("p1", 10)).unwrap();
        let k2 = CacheKeyGenerator::method_key("TaskService", "find_open", &("p1", 10)).unwrap();
        let k3 = CacheKeyGenerator::method_key("TaskService", "find_open", &("p1", 11)).unwrap();
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.starts_with("TaskService.find_open:"));
    }

    #[test]
    fn test_sort_precedence_changes_the_key() {
        let options = ExecutionOptions::default();
        let by_priority = Stage::Sort(SortSpec::new().asc("priority").desc("createdAt"));
        let by_date = Stage::Sort(SortSpec::new().desc("createdAt").asc("priority"));
        assert_ne!(
            CacheKeyGenerator::pipeline_key("tasks", &[by_priority], &options).unwrap(),
            CacheKeyGenerator::pipeline_key("tasks", &[by_date], &options).unwrap()
        );
    }

    #[test]
    fn test_compound_hint_order_changes_the_key() {
        let hint = |keys: Value| ExecutionOptions {
            hint: Some(IndexHint::Keys(keys)),
            ..Default::default()
        };
        let stages = [match_stage()];
        let ab = hint(json!({ "a": 1, "b": 1 }));
        let ba = hint(json!({ "b": 1, "a": 1 }));
        assert_ne!(
            CacheKeyGenerator::pipeline_key("tasks", &stages, &ab).unwrap(),
            CacheKeyGenerator::pipeline_key("tasks", &stages, &ba).unwrap()
        );
    }

    #[test]
    fn test_ordered_payloads_still_canonicalize_nested_values() {
        let lookup = |inner: Value| {
            Stage::Lookup(
                LookupSpec::new("tasks", "_id", "projectId", "tasks").with_pipeline(vec![
                    Stage::Match(inner),
                    Stage::Sort(SortSpec::new().desc("createdAt")),
                ]),
            )
        };
        let options = ExecutionOptions::default();
        let a = lookup(json!({ "x": 1, "y": 2 }));
        let b = lookup(json!({ "y": 2, "x": 1 }));
        assert_eq!(
            CacheKeyGenerator::pipeline_key("projects", &[a], &options).unwrap(),
            CacheKeyGenerator::pipeline_key("projects", &[b], &options).unwrap()
        );
    }

    #[test]
    fn test_method_identity_is_unambiguous() {
        let k1 = CacheKeyGenerator::method_key("A.b", "c", &1).unwrap();
        let k2 = CacheKeyGenerator::method_key("A", "b.c", &1).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_non_serializable_arguments_fail() {
        let mut args: HashMap<(u8, u8), u8> = HashMap::new();
        args.insert((1, 2), 3);
        let result = CacheKeyGenerator::method_key("Grid", "cells", &args);
        assert!(matches!(result, Err(CacheError::KeyGenerationFailed(_))));
    }
}
