//! Store trait abstraction.

use async_trait::async_trait;
use chrono::NaiveDate;
use rdburn_core::{
    AssigneeSnapshot, ChangeRecord, DailySnapshot, Issue, ProjectId, RangeMeta, Time, Version,
};

/// Error type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A snapshot row for this (date, target) already exists
    #[error("snapshot for {target} on {date} already exists (pass --force to recompute)")]
    Conflict {
        /// Target range key
        target: String,
        /// Snapshot date
        date: NaiveDate,
    },

    /// An assignee id/name column pair with exactly one half set
    #[error("issue #{issue_id}: assignee id/name pair is half-set")]
    HalfAssignee {
        /// Offending issue
        issue_id: i64,
    },

    /// A persisted value that no longer parses
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Store abstraction for rdburn data.
///
/// This trait allows different storage backends to be plugged in. All
/// operations are pass/fail; none leave partial state behind.
#[async_trait]
pub trait Store: Send + Sync {
    // === Version operations ===

    /// Save a version (create or update).
    async fn upsert_version(&mut self, version: &Version) -> Result<()>;

    /// Load a version by name within a project.
    async fn load_version(&self, project: ProjectId, name: &str) -> Result<Option<Version>>;

    // === Issue operations ===

    /// Save an issue's current state (create or update).
    async fn upsert_issue(&mut self, issue: &Issue) -> Result<()>;

    /// Load the current state of every issue in a project.
    async fn load_issues(&self, project: ProjectId) -> Result<Vec<Issue>>;

    /// Record an issue's first-observed field values. A second insert for
    /// the same issue is a no-op; the baseline is immutable.
    async fn insert_baseline(&mut self, issue: &Issue) -> Result<()>;

    /// Load every baseline in a project.
    async fn load_baselines(&self, project: ProjectId) -> Result<Vec<Issue>>;

    // === Change journal ===

    /// Append change records, skipping any already present. Returns the
    /// number actually inserted.
    async fn append_changes(&mut self, records: &[ChangeRecord]) -> Result<usize>;

    /// Load the full journal for a project, unordered.
    async fn load_journal(&self, project: ProjectId) -> Result<Vec<ChangeRecord>>;

    // === Snapshots ===

    /// Load one daily snapshot.
    async fn load_snapshot(&self, target: &str, date: NaiveDate) -> Result<Option<DailySnapshot>>;

    /// Load all daily snapshots for a target, ordered by date.
    async fn load_snapshots(&self, target: &str) -> Result<Vec<DailySnapshot>>;

    /// Load the per-assignee rows of one day.
    async fn load_assignee_day(
        &self,
        target: &str,
        date: NaiveDate,
    ) -> Result<Vec<AssigneeSnapshot>>;

    /// Commit one day's DailySnapshot, its AssigneeSnapshots, and the
    /// updated meta in a single transaction. Without `overwrite`, an
    /// existing row for the (date, target) key fails with
    /// [`StoreError::Conflict`] and nothing is written.
    async fn save_day(
        &mut self,
        target: &str,
        snapshot: &DailySnapshot,
        assignees: &[AssigneeSnapshot],
        meta: &RangeMeta,
        overwrite: bool,
    ) -> Result<()>;

    // === Meta state ===

    /// Load the persisted per-range meta; defaults when absent.
    async fn load_meta(&self, target: &str) -> Result<RangeMeta>;

    /// Instant the change journal is known-complete through.
    async fn sync_horizon(&self, project: ProjectId) -> Result<Option<Time>>;

    /// Record the journal coverage horizon after a successful sync.
    async fn set_sync_horizon(&mut self, project: ProjectId, at: Time) -> Result<()>;

    /// Resolve a project identifier string to its tracker id.
    async fn project_id(&self, identifier: &str) -> Result<Option<ProjectId>>;

    /// Remember an identifier → project id mapping.
    async fn set_project_id(&mut self, identifier: &str, project: ProjectId) -> Result<()>;
}
