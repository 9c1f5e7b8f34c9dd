//! Snapshot rows - the daily "closing price" of a target range.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::issue::Assignee;

/// Aggregate figures for one (date, target range) pair.
///
/// Keyed (date, target) in storage and immutable once written; only a full,
/// forced recomputation may replace it, and that recomputation must
/// reproduce identical values from identical inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    /// Civil date of the snapshot
    pub date: NaiveDate,

    /// Total effective estimate over all root issues in range
    pub scope_hours: f64,

    /// Effective estimate restricted to not-done work
    pub remaining_hours: f64,

    /// `scope_hours - remaining_hours`
    pub completed_hours: f64,

    /// Where the ideal line sits on this date
    pub ideal_remaining_hours: f64,

    /// Completion net of scope churn; `None` on the first day of a range
    pub burn_hours: Option<f64>,

    /// Mean pace prevailing as of this date
    pub v_avg: f64,

    /// Best observed pace prevailing as of this date
    pub v_max: f64,

    /// Worst observed pace prevailing as of this date
    pub v_min: f64,
}

/// Per-assignee figures for one (date, target range, assignee) triple.
///
/// Summing a date's rows (including the unassigned bucket) reproduces the
/// aggregate [`DailySnapshot`] scope/remaining/completed exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssigneeSnapshot {
    /// Civil date of the snapshot
    pub date: NaiveDate,

    /// Attributed assignee; `None` is the unassigned bucket
    pub assignee: Option<Assignee>,

    /// Attributed scope
    pub scope_hours: f64,

    /// Attributed remaining effort
    pub remaining_hours: f64,

    /// `scope_hours - remaining_hours`
    pub completed_hours: f64,
}

/// Per-range persisted state.
///
/// Passed into and returned from each day's computation; never held as
/// process-global state, so replay and live snapshots share one code path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeMeta {
    /// Initial committed scope S0, frozen at the first snapshot and never
    /// recomputed
    pub initial_scope: Option<f64>,

    /// Date of the first snapshot ever taken for the range
    pub first_snapshot_date: Option<NaiveDate>,

    /// Date of the most recent snapshot; replay resumes after this
    pub last_snapshot_date: Option<NaiveDate>,
}
