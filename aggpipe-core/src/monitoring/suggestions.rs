//! Static pipeline hints.

use crate::pipeline::{Stage, StageKind};

/// Scan `stages` once and return improvement hints, in the order found.
pub fn suggest_optimizations(stages: &[Stage]) -> Vec<String> {
    let mut suggestions = Vec::new();
    let mut seen_lookup = false;
    let mut seen_sort = false;
    let mut has_limit = false;
    let mut has_lookup = false;
    let mut groups = 0usize;

    for (position, stage) in stages.iter().enumerate() {
        match stage.kind() {
            StageKind::Lookup => {
                seen_lookup = true;
                has_lookup = true;
            },
            StageKind::Match if seen_lookup => suggestions.push(format!(
                "Move the $match at position {position} before the $lookup to filter documents before joining"
            )),
            StageKind::Sort => {
                if seen_lookup && !seen_sort {
                    suggestions.push(format!(
                        "Sort before the $lookup (position {position}) so the sort can use an index"
                    ));
                }
                seen_sort = true;
            },
            StageKind::Limit => has_limit = true,
            StageKind::Group => groups += 1,
            _ => {},
        }
    }

    if has_lookup && !has_limit {
        suggestions.push("Add a $limit to bound the number of documents joined by $lookup".to_string());
    }
    if groups > 1 {
        suggestions.push(format!(
            "Pipeline has {groups} $group stages; combine them into one where possible"
        ));
    }

    suggestions
}
