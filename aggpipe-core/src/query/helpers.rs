//! Shortcuts for common pipeline shapes.
//!
//! Argument problems (non-positive page sizes, empty field lists, unknown
//! timeline entities, malformed ids) are rejected here, before anything
//! reaches the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::core::{AggPipeError, ErrorContext, ObjectId, Result};
use crate::invalid_argument;
use crate::pipeline::{LookupSpec, PipelineBuilder, SortSpec, Stage, UnwindSpec};

/// Entity kinds with a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEntity {
    /// Tasks
    Task,
    /// Projects
    Project,
    /// Comments
    Comment,
    /// Users
    User,
}

impl TimelineEntity {
    /// Timestamp field bucketed by the timeline.
    pub fn date_field(&self) -> &'static str {
        "createdAt"
    }
}

impl FromStr for TimelineEntity {
    type Err = AggPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "task" => Ok(Self::Task),
            "project" => Ok(Self::Project),
            "comment" => Ok(Self::Comment),
            "user" => Ok(Self::User),
            other => Err(invalid_argument!(
                "unsupported timeline entity type '{}' (expected task, project, comment or user)",
                other
            )),
        }
    }
}

/// Bucket width of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineInterval {
    /// One bucket per calendar day
    Day,
    /// One bucket per ISO week
    Week,
    /// One bucket per calendar month
    Month,
}

impl TimelineInterval {
    fn date_format(&self) -> &'static str {
        match self {
            Self::Day => "%Y-%m-%d",
            Self::Week => "%G-W%V",
            Self::Month => "%Y-%m",
        }
    }
}

impl FromStr for TimelineInterval {
    type Err = AggPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(invalid_argument!(
                "unsupported timeline interval '{}' (expected day, week or month)",
                other
            )),
        }
    }
}

impl fmt::Display for TimelineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        })
    }
}

/// Output field name for an accumulator over `field`.
fn metric_name(field: &str, suffix: &str) -> String {
    format!("{}_{suffix}", field.replace('.', "_"))
}

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Extended-JSON date, so the engine compares against date-typed fields.
fn date_document(at: &DateTime<Utc>) -> Value {
    json!({ "$date": rfc3339(at) })
}

/// Common pipeline shapes on [`PipelineBuilder`].
pub trait QueryHelpersExt: Sized {
    /// `$skip` + `$limit` for a 1-based page.
    fn paginate(self, page: u64, limit: u64) -> Result<Self>;

    /// A `$facet` with the requested page under `data` and the overall count
    /// under `total`.
    fn paginate_with_total(self, page: u64, limit: u64) -> Result<Self>;

    /// Join at most one document, keeping inputs without a match.
    fn join_one(self, from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Self;

    /// Join all matching documents into an array.
    fn join_many(self, from: &str, local_field: &str, foreign_field: &str, as_field: &str)
        -> Self;

    /// Case-insensitive substring match of `term` on any of `fields`.
    ///
    /// A blank term adds no stage.
    fn search(self, term: &str, fields: &[&str]) -> Result<Self>;

    /// Restrict `field` to `[from, to]`; either bound may be open. Bounds are
    /// written as extended-JSON dates (`{"$date": ...}`).
    fn date_range(
        self,
        field: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Self>;

    /// Restrict `field` to the given ObjectIds.
    fn by_ids<S: AsRef<str>>(self, field: &str, ids: &[S]) -> Result<Self>;

    /// Group by `group_by` with a count plus sum and average of each metric
    /// field, largest groups first.
    fn analytics(self, group_by: &str, metrics: &[&str]) -> Self;

    /// Count entities per day, week or month, oldest bucket first.
    fn timeline(self, entity_type: &str, interval: &str) -> Result<Self>;
}

fn page_stages(page: u64, limit: u64) -> Result<[Stage; 2]> {
    if page < 1 {
        return Err(invalid_argument!("page must be at least 1, got {}", page));
    }
    if limit == 0 {
        return Err(invalid_argument!("limit must be positive"));
    }
    let skip = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| invalid_argument!("page {} with limit {} overflows", page, limit))?;
    Ok([Stage::Skip(skip), Stage::Limit(limit)])
}

impl QueryHelpersExt for PipelineBuilder {
    fn paginate(self, page: u64, limit: u64) -> Result<Self> {
        let [skip, limit] = page_stages(page, limit).with_context("paginate")?;
        Ok(self.stage(skip).stage(limit))
    }

    fn paginate_with_total(self, page: u64, limit: u64) -> Result<Self> {
        let data = page_stages(page, limit)
            .with_context("paginate_with_total")?
            .to_vec();
        let mut facets = IndexMap::new();
        facets.insert("data".to_string(), data);
        facets.insert(
            "total".to_string(),
            vec![Stage::Group(json!({ "_id": null, "total": { "$sum": 1 } }))],
        );
        Ok(self.facet(facets))
    }

    fn join_one(self, from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        self.lookup(LookupSpec::new(from, local_field, foreign_field, as_field))
            .unwind_with(UnwindSpec::new(as_field).preserve_empty())
    }

    fn join_many(
        self,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> Self {
        self.lookup(LookupSpec::new(from, local_field, foreign_field, as_field))
    }

    fn search(self, term: &str, fields: &[&str]) -> Result<Self> {
        if fields.is_empty() {
            return Err(invalid_argument!("search requires at least one field"));
        }
        let term = term.trim();
        if term.is_empty() {
            return Ok(self);
        }

        let pattern = regex::escape(term);
        let branches: Vec<Value> = fields
            .iter()
            .map(|field| json!({ *field: { "$regex": pattern, "$options": "i" } }))
            .collect();
        Ok(self.filter(json!({ "$or": branches })))
    }

    fn date_range(
        self,
        field: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let mut range = Map::new();
        match (from, to) {
            (None, None) => {
                return Err(invalid_argument!("date_range on '{}' needs at least one bound", field))
            },
            (Some(from), Some(to)) if from > to => {
                return Err(invalid_argument!(
                    "date_range on '{}' starts after it ends ({} > {})",
                    field,
                    rfc3339(&from),
                    rfc3339(&to)
                ))
            },
            _ => {},
        }
        if let Some(from) = from {
            range.insert("$gte".to_string(), date_document(&from));
        }
        if let Some(to) = to {
            range.insert("$lte".to_string(), date_document(&to));
        }
        Ok(self.filter(json!({ field: range })))
    }

    fn by_ids<S: AsRef<str>>(self, field: &str, ids: &[S]) -> Result<Self> {
        let ids = ids
            .iter()
            .map(|id| ObjectId::parse(id.as_ref()).map(|oid| oid.to_document()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.filter(json!({ field: { "$in": ids } })))
    }

    fn analytics(self, group_by: &str, metrics: &[&str]) -> Self {
        let group_key = format!("${}", group_by.trim_start_matches('$'));
        let mut group = Map::new();
        group.insert("_id".to_string(), Value::String(group_key));
        group.insert("count".to_string(), json!({ "$sum": 1 }));
        for field in metrics {
            let source = format!("${}", field.trim_start_matches('$'));
            group.insert(metric_name(field, "total"), json!({ "$sum": source }));
            group.insert(metric_name(field, "avg"), json!({ "$avg": source }));
        }

        self.group(Value::Object(group)).sort(SortSpec::new().desc("count"))
    }

    fn timeline(self, entity_type: &str, interval: &str) -> Result<Self> {
        let entity = entity_type
            .parse::<TimelineEntity>()
            .with_context_lazy(|| format!("timeline for {}", self.collection()))?;
        let interval = interval
            .parse::<TimelineInterval>()
            .with_context_lazy(|| format!("timeline for {}", self.collection()))?;
        let date_field = entity.date_field();

        Ok(self
            .filter(json!({ date_field: { "$exists": true } }))
            .group(json!({
                "_id": {
                    "$dateToString": {
                        "format": interval.date_format(),
                        "date": format!("${date_field}"),
                    }
                },
                "count": { "$sum": 1 },
            }))
            .sort(SortSpec::new().asc("_id")))
    }
}
