//! Pure presentation helpers over merged documents: grouping, due dates, threshold
//! highlighting, and the one-record-per-day resolver.

pub mod daily;
pub mod due;
pub mod group;
pub mod threshold;

pub use daily::{day_bounds, find_today, get_or_create_today, upsert_today};
pub use due::{due_status, DueStatus};
pub use group::{group_by, group_by_field, UNCATEGORIZED};
pub use threshold::{highlight, spec_range_label, Threshold};
