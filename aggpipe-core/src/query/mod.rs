/// Pagination, joins, search, date ranges, analytics and timelines
pub mod helpers;

pub use helpers::{QueryHelpersExt, TimelineEntity, TimelineInterval};
