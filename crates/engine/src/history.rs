//! Historical reconstruction from the change journal.
//!
//! A pure last-write-wins reducer applied in (timestamp, insertion) order
//! over per-issue baselines. One cursor pass serves a whole range replay:
//! the running state map only ever moves forward through the log, so
//! replaying N days costs O(issues + changes), not O(days x changes).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rdburn_core::{ChangeRecord, FieldChange, Issue, IssueId, TargetRange};

/// Running journal replay state.
///
/// Cutoffs passed to [`HistoryCursor::advance_to`] must be non-decreasing.
pub struct HistoryCursor {
    state: HashMap<IssueId, Issue>,
    journal: Vec<ChangeRecord>,
    pos: usize,
}

impl HistoryCursor {
    /// Start a replay. `baselines` carry each issue's first-observed field
    /// values; the journal may arrive unordered and is sorted once here.
    pub fn new(baselines: Vec<Issue>, mut journal: Vec<ChangeRecord>) -> Self {
        journal.sort_by_key(ChangeRecord::sort_key);
        let state = baselines.into_iter().map(|issue| (issue.id, issue)).collect();
        Self { state, journal, pos: 0 }
    }

    /// Apply every record effective at or before `cutoff`.
    pub fn advance_to(&mut self, cutoff: DateTime<Utc>) -> &HashMap<IssueId, Issue> {
        while let Some(record) = self.journal.get(self.pos) {
            if record.at > cutoff {
                break;
            }
            if let Some(issue) = self.state.get_mut(&record.issue_id) {
                apply(issue, record);
            }
            self.pos += 1;
        }
        &self.state
    }

    /// The issue set a live resolver would have seen in `target` at the end
    /// of the day `cutoff` closes.
    ///
    /// Issues outside the range at the cutoff are omitted even if earlier
    /// days included them; issues first observed after the cutoff do not
    /// exist yet.
    pub fn state_in_range(
        &self,
        target: &TargetRange,
        cutoff: DateTime<Utc>,
    ) -> HashMap<IssueId, Issue> {
        self.state
            .values()
            .filter(|issue| issue.first_seen_at <= cutoff && target.contains(issue))
            .map(|issue| (issue.id, issue.clone()))
            .collect()
    }
}

/// Last-write-wins field reducer.
fn apply(issue: &mut Issue, record: &ChangeRecord) {
    match &record.change {
        FieldChange::Estimate { to, .. } => issue.estimated_hours = *to,
        FieldChange::Status { to, .. } => issue.status.clone_from(to),
        FieldChange::Version { to, .. } => issue.version_id = *to,
        FieldChange::Assignee { to, .. } => issue.assignee.clone_from(to),
        FieldChange::DueDate { to, .. } => issue.due_date = *to,
    }
    issue.updated_at = record.at;
}

/// Reconstruct a single date's in-range issue set.
pub fn state_at(
    baselines: Vec<Issue>,
    journal: Vec<ChangeRecord>,
    target: &TargetRange,
    cutoff: DateTime<Utc>,
) -> HashMap<IssueId, Issue> {
    let mut cursor = HistoryCursor::new(baselines, journal);
    cursor.advance_to(cutoff);
    cursor.state_in_range(target, cutoff)
}
