//! rdburn core data models.
//!
//! This crate defines the entities shared by the sync, storage, and
//! aggregation layers: issues and their parent links, the append-only
//! change journal, target ranges, and daily snapshot rows.

#![warn(missing_docs)]

// Core identities
mod id;

// Tracked work and its history
mod change;
mod issue;

// Reporting scope and output rows
mod snapshot;
mod target;

// Re-exports
pub use id::{IssueId, ProjectId, UserId, VersionId};

pub use change::{ChangeRecord, FieldChange};
pub use issue::{Assignee, DoneSet, Issue};

pub use snapshot::{AssigneeSnapshot, DailySnapshot, RangeMeta};
pub use target::{TargetRange, Version};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
