//! Issue model - the unit of tracked work.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{IssueId, ProjectId, UserId, VersionId};

/// A unit of tracked work, as observed from the remote tracker.
///
/// The hierarchy owns parent→children edges; an issue carries its parent
/// reference but never owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Tracker-assigned identifier
    pub id: IssueId,

    /// Owning project
    pub project_id: ProjectId,

    /// Milestone membership; `None` when the issue sits outside any version
    pub version_id: Option<VersionId>,

    /// Parent issue, if any
    pub parent_id: Option<IssueId>,

    /// Issue title
    pub subject: String,

    /// Status name as reported by the tracker; completion is derived by
    /// matching against a [`DoneSet`]
    pub status: String,

    /// Estimated effort in hours; `None` means not yet estimated
    pub estimated_hours: Option<f64>,

    /// Assignee, or `None` for unassigned
    pub assignee: Option<Assignee>,

    /// Due date, if any
    pub due_date: Option<NaiveDate>,

    /// When the sync layer first observed this issue
    pub first_seen_at: DateTime<Utc>,

    /// Last change timestamp
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Whether this issue's status counts as completed.
    pub fn is_done(&self, done: &DoneSet) -> bool {
        done.contains(&self.status)
    }
}

/// Assignee reference.
///
/// Both halves are always present; a half-set id/name pair coming off the
/// wire or out of the database is a structural error at the decode boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    /// Tracker user id
    pub id: UserId,

    /// Display name
    pub name: String,
}

/// The set of status names that count as completed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoneSet(HashSet<String>);

impl DoneSet {
    /// Build from any collection of status names.
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(statuses.into_iter().map(Into::into).collect())
    }

    /// Whether `status` names a completed state.
    pub fn contains(&self, status: &str) -> bool {
        self.0.contains(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issue(status: &str) -> Issue {
        Issue {
            id: IssueId(1),
            project_id: ProjectId(1),
            version_id: None,
            parent_id: None,
            subject: "test".to_string(),
            status: status.to_string(),
            estimated_hours: None,
            assignee: None,
            due_date: None,
            first_seen_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn done_is_derived_from_status_name() {
        let done = DoneSet::new(["Closed", "Resolved"]);
        assert!(issue("Closed").is_done(&done));
        assert!(issue("Resolved").is_done(&done));
        assert!(!issue("In Progress").is_done(&done));
    }

    #[test]
    fn done_match_is_case_sensitive() {
        let done = DoneSet::new(["Closed"]);
        assert!(!issue("closed").is_done(&done));
    }
}
