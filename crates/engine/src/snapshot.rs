//! Daily snapshot computation.
//!
//! One call computes one (date, target range) row plus its per-assignee
//! split. The computation is a pure function of the target definition, the
//! (reconstructed or live) issue state, the calendar, the previous day's
//! persisted snapshot, and the persisted meta - recomputing with the same
//! inputs reproduces identical values.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rdburn_core::{
    AssigneeSnapshot, DailySnapshot, DoneSet, Issue, IssueId, RangeMeta, TargetRange, UserId,
};

use crate::calendar::BusinessCalendar;
use crate::error::EngineError;
use crate::hierarchy::{self, Resolution, RollupWarning};
use crate::velocity::{self, OutlierFilter};

/// Per-day inputs that come from persisted state rather than the issue set.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotDay<'a> {
    /// Range being snapshotted
    pub target: &'a TargetRange,

    /// Civil date being closed
    pub date: NaiveDate,

    /// The previous business day's persisted snapshot, if any
    pub previous: Option<&'a DailySnapshot>,

    /// Persisted per-range meta as of before this day
    pub meta: &'a RangeMeta,

    /// Burns of the elapsed business days before `date`, oldest first
    pub prior_burns: &'a [f64],

    /// Optional outlier exclusion for the velocity figures
    pub outlier: Option<OutlierFilter>,
}

/// One day's computed output, plus the meta state to persist with it.
#[derive(Debug, Clone)]
pub struct DayOutcome {
    /// The aggregate row
    pub snapshot: DailySnapshot,

    /// Per-assignee rows, unassigned bucket first
    pub assignees: Vec<AssigneeSnapshot>,

    /// Rollup conflicts encountered while resolving the hierarchy
    pub warnings: Vec<RollupWarning>,

    /// Meta to persist atomically with the snapshot
    pub meta: RangeMeta,
}

/// Compute one day's snapshot from the in-range issue state.
pub fn compute_day(
    day: SnapshotDay<'_>,
    issues: &HashMap<IssueId, Issue>,
    done: &DoneSet,
    calendar: &BusinessCalendar,
) -> Result<DayOutcome, EngineError> {
    let resolution = hierarchy::resolve(issues, done)?;
    let scope = resolution.scope_hours();
    let remaining = resolution.remaining_hours();
    let completed = scope - remaining;

    // S0 and the range's first day freeze at the first snapshot ever taken
    let mut meta = day.meta.clone();
    if meta.initial_scope.is_none() {
        meta.initial_scope = Some(scope);
    }
    if meta.first_snapshot_date.is_none() {
        meta.first_snapshot_date = Some(day.date);
    }
    meta.last_snapshot_date = Some(match meta.last_snapshot_date {
        Some(last) => last.max(day.date),
        None => day.date,
    });

    let s0 = meta.initial_scope.unwrap_or(scope);
    let ideal = ideal_remaining(day.target, &meta, day.date, s0, calendar);

    // burn: day-over-day completion net of scope churn, never negative
    let burn = day.previous.map(|prev| {
        let progress = prev.remaining_hours - remaining;
        let churn = scope - prev.scope_hours;
        (progress - churn).max(0.0)
    });

    let mut burns = day.prior_burns.to_vec();
    burns.extend(burn);
    let pace = velocity::summarize(&burns, day.outlier);

    let snapshot = DailySnapshot {
        date: day.date,
        scope_hours: scope,
        remaining_hours: remaining,
        completed_hours: completed,
        ideal_remaining_hours: ideal,
        burn_hours: burn,
        v_avg: pace.avg,
        v_max: pace.max,
        v_min: pace.min,
    };

    Ok(DayOutcome {
        snapshot,
        assignees: assignee_rows(day.date, &resolution),
        warnings: resolution.warnings,
        meta,
    })
}

/// `S0 * (D - index(d)) / D`, floored at 0. A zero-length range holds S0 on
/// its start day and 0 after; a range without both start and due dates has
/// no ideal line.
fn ideal_remaining(
    target: &TargetRange,
    meta: &RangeMeta,
    date: NaiveDate,
    s0: f64,
    calendar: &BusinessCalendar,
) -> f64 {
    let (Some(start), Some(due)) = (target.start_date(meta), target.due_date()) else {
        return 0.0;
    };
    let total = calendar.count_working_days(start, due);
    if total == 0 {
        return if date <= start { s0 } else { 0.0 };
    }
    let elapsed = calendar.business_day_index(start, date).min(total);
    (s0 * f64::from(total - elapsed) / f64::from(total)).max(0.0)
}

/// Fold root shares into one row per assignee. The BTreeMap keyed by user id
/// keeps row order deterministic, unassigned bucket first; an issue
/// reassigned since yesterday moves its whole contribution, never a prorated
/// part.
fn assignee_rows(date: NaiveDate, resolution: &Resolution) -> Vec<AssigneeSnapshot> {
    let mut rows: BTreeMap<Option<UserId>, AssigneeSnapshot> = BTreeMap::new();
    for root in &resolution.roots {
        for share in &root.shares {
            let row = rows
                .entry(share.assignee.as_ref().map(|a| a.id))
                .or_insert_with(|| AssigneeSnapshot {
                    date,
                    assignee: share.assignee.clone(),
                    scope_hours: 0.0,
                    remaining_hours: 0.0,
                    completed_hours: 0.0,
                });
            row.scope_hours += share.scope_hours;
            row.remaining_hours += share.remaining_hours;
        }
    }
    rows.into_values()
        .map(|mut row| {
            row.completed_hours = row.scope_hours - row.remaining_hours;
            row
        })
        .collect()
}
