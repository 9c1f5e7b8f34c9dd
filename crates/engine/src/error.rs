//! Engine error taxonomy.
//!
//! Rollup conflicts are not errors; they travel as
//! [`crate::hierarchy::RollupWarning`]s next to the snapshot they belong to.

use chrono::NaiveDate;
use rdburn_core::IssueId;
use rdburn_storage::StoreError;

/// Fatal failures of the aggregation core.
///
/// Every variant aborts the current date's computation and leaves prior
/// snapshots untouched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A parent chain loops back on itself
    #[error("cyclic parent link detected at issue #{0}")]
    ParentCycle(IssueId),

    /// The change journal does not cover the requested date; reconstruction
    /// would be unsound
    #[error("change journal only covers through {synced_through}; cannot replay {date} (run `rdburn sync` first)")]
    ContinuityGap {
        /// First date that cannot be reconstructed
        date: NaiveDate,
        /// Journal coverage horizon, or "never"
        synced_through: String,
    },

    /// Persistence failure, including snapshot uniqueness conflicts
    #[error(transparent)]
    Store(#[from] StoreError),
}
