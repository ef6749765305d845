//! Static analysis over stage sequences: `$match` hoisting and validation.
//!
//! Both passes work on [`StageKind`] and the stage payloads only; they never
//! consult the engine.

use serde::Serialize;

use super::stage::{Document, Stage, StageKind};

/// Query operators whose field references cannot be determined statically.
const OPAQUE_OPERATORS: &[&str] = &["$expr", "$where", "$function", "$text"];

/// Logical operators whose operands are nested conditions.
const LOGICAL_OPERATORS: &[&str] = &["$and", "$or", "$nor"];

/// Outcome of [`validate_stages`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// False only when a structural error was found
    pub is_valid: bool,
    /// Advisory findings; never affect `is_valid`
    pub warnings: Vec<String>,
    /// Structural errors
    pub errors: Vec<String>,
}

/// Stages that reshape documents or change cardinality. `$match` is never
/// moved across one of these.
fn is_barrier(kind: StageKind) -> bool {
    matches!(
        kind,
        StageKind::Group | StageKind::Project | StageKind::Facet | StageKind::Limit | StageKind::Skip
    )
}

/// Top-level fields a stage adds or rewrites.
fn introduced_fields(stage: &Stage) -> Vec<String> {
    match stage {
        Stage::Lookup(spec) => vec![spec.as_field.clone()],
        Stage::AddFields(Document::Object(fields)) => fields.keys().cloned().collect(),
        Stage::Unwind(spec) => vec![spec.field().to_string()],
        _ => Vec::new(),
    }
}

/// Field paths referenced by a `$match` condition, or `None` when the
/// condition uses an operator that hides its references.
fn referenced_fields(condition: &Document) -> Option<Vec<String>> {
    let Document::Object(map) = condition else {
        return None;
    };

    let mut fields = Vec::new();
    for (key, value) in map {
        if OPAQUE_OPERATORS.contains(&key.as_str()) {
            return None;
        }
        if LOGICAL_OPERATORS.contains(&key.as_str()) {
            let Document::Array(branches) = value else {
                return None;
            };
            for branch in branches {
                fields.extend(referenced_fields(branch)?);
            }
        } else if key.starts_with('$') {
            // Unknown top-level operator ($comment and friends carry no field).
            if key != "$comment" {
                return None;
            }
        } else {
            fields.push(key.clone());
        }
    }
    Some(fields)
}

/// Whether two dotted paths overlap (equal, or one is a prefix of the other).
fn paths_overlap(a: &str, b: &str) -> bool {
    a == b
        || a.strip_prefix(b).is_some_and(|rest| rest.starts_with('.'))
        || b.strip_prefix(a).is_some_and(|rest| rest.starts_with('.'))
}

/// Move `$match` stages ahead of the stages before them.
///
/// Within each segment delimited by a barrier stage, a `$match` whose fields
/// do not depend on any field introduced earlier in the segment is placed
/// after the previously hoisted matches. Everything else keeps its relative
/// order. Applying the pass twice yields the same sequence.
pub fn optimize_stages(stages: Vec<Stage>) -> Vec<Stage> {
    let mut output: Vec<Stage> = Vec::with_capacity(stages.len());
    let mut insert_at = 0;
    let mut introduced: Vec<String> = Vec::new();

    for stage in stages {
        let kind = stage.kind();

        if is_barrier(kind) {
            output.push(stage);
            insert_at = output.len();
            introduced.clear();
            continue;
        }

        if let Stage::Match(condition) = &stage {
            let hoistable = referenced_fields(condition).is_some_and(|fields| {
                !fields
                    .iter()
                    .any(|field| introduced.iter().any(|intro| paths_overlap(field, intro)))
            });
            if hoistable {
                output.insert(insert_at, stage);
                insert_at += 1;
            } else {
                output.push(stage);
            }
            continue;
        }

        introduced.extend(introduced_fields(&stage));
        output.push(stage);
    }

    output
}

/// Check a stage sequence for structural errors and performance hazards.
pub fn validate_stages(stages: &[Stage]) -> ValidationReport {
    let mut report = ValidationReport {
        is_valid: true,
        ..Default::default()
    };

    let mut seen_lookup = false;
    let has_limit = stages.iter().any(|s| s.kind() == StageKind::Limit);

    for (position, stage) in stages.iter().enumerate() {
        match stage {
            Stage::Match(condition) => {
                if seen_lookup {
                    report.warnings.push(format!(
                        "$match at position {position} follows a $lookup; filter before joining where possible"
                    ));
                }
                require_object(&mut report.errors, position, stage.kind(), condition);
            },
            Stage::Lookup(spec) => {
                seen_lookup = true;
                if let Some(pipeline) = &spec.pipeline {
                    let nested = validate_stages(pipeline);
                    report.errors.extend(
                        nested
                            .errors
                            .into_iter()
                            .map(|e| format!("$lookup '{}' pipeline: {e}", spec.as_field)),
                    );
                }
            },
            Stage::Group(spec) => match spec {
                Document::Object(map) if !map.contains_key("_id") => report
                    .errors
                    .push(format!("$group at position {position} has no _id")),
                Document::Object(_) => {},
                _ => require_object(&mut report.errors, position, stage.kind(), spec),
            },
            Stage::Project(spec) | Stage::AddFields(spec) => {
                require_object(&mut report.errors, position, stage.kind(), spec);
            },
            Stage::Limit(0) => report
                .errors
                .push(format!("$limit at position {position} must be positive")),
            Stage::Facet(facets) => {
                if facets.is_empty() {
                    report
                        .errors
                        .push(format!("$facet at position {position} has no facets"));
                }
                for (name, pipeline) in facets {
                    let nested = validate_stages(pipeline);
                    report
                        .errors
                        .extend(nested.errors.into_iter().map(|e| format!("facet '{name}': {e}")));
                }
            },
            Stage::Sort(spec) if spec.is_empty() => report
                .errors
                .push(format!("$sort at position {position} has no keys")),
            _ => {},
        }
    }

    if seen_lookup && !has_limit {
        report
            .warnings
            .push("$lookup without $limit may produce large result sets".to_string());
    }

    report.is_valid = report.errors.is_empty();
    report
}

fn require_object(errors: &mut Vec<String>, position: usize, kind: StageKind, payload: &Document) {
    if !payload.is_object() {
        errors.push(format!("{kind} at position {position} requires an object payload"));
    }
}
