//! Target ranges - the scope-defining criterion for a report.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::id::{ProjectId, VersionId};
use crate::issue::Issue;
use crate::snapshot::RangeMeta;

/// A tracker milestone (Redmine "version").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// Tracker-assigned identifier
    pub id: VersionId,

    /// Owning project
    pub project_id: ProjectId,

    /// Version name
    pub name: String,

    /// First day of the milestone
    pub start_date: Option<NaiveDate>,

    /// Committed due date
    pub due_date: Option<NaiveDate>,
}

/// What a report tracks: a fixed milestone, or every issue due by a date.
///
/// Both cases carry their own membership predicate and start-date rule and
/// are consumed uniformly by the snapshot calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetRange {
    /// All issues assigned to one version
    Milestone(Version),

    /// All issues of a project due on or before a date
    DueDateCut {
        /// Owning project
        project_id: ProjectId,
        /// Inclusive due-date bound
        due_date: NaiveDate,
        /// Display name for the cut
        name: String,
    },
}

impl TargetRange {
    /// Storage key; snapshot and meta rows are scoped by this.
    pub fn key(&self) -> String {
        match self {
            TargetRange::Milestone(version) => format!("version:{}", version.id),
            TargetRange::DueDateCut { due_date, .. } => format!("release:{due_date}"),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            TargetRange::Milestone(version) => &version.name,
            TargetRange::DueDateCut { name, .. } => name,
        }
    }

    /// Membership predicate: does `issue` belong to this range right now?
    pub fn contains(&self, issue: &Issue) -> bool {
        match self {
            TargetRange::Milestone(version) => issue.version_id == Some(version.id),
            TargetRange::DueDateCut { project_id, due_date, .. } => {
                issue.project_id == *project_id
                    && issue.due_date.is_some_and(|due| due <= *due_date)
            }
        }
    }

    /// First day of the ideal line. A milestone carries its own start date;
    /// a due-date cut starts on the day its first snapshot was taken.
    pub fn start_date(&self, meta: &RangeMeta) -> Option<NaiveDate> {
        match self {
            TargetRange::Milestone(version) => version.start_date,
            TargetRange::DueDateCut { .. } => meta.first_snapshot_date,
        }
    }

    /// Committed due date.
    pub fn due_date(&self) -> Option<NaiveDate> {
        match self {
            TargetRange::Milestone(version) => version.due_date,
            TargetRange::DueDateCut { due_date, .. } => Some(*due_date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IssueId;
    use chrono::{TimeZone, Utc};

    fn issue(version: Option<i64>, due: Option<&str>) -> Issue {
        Issue {
            id: IssueId(1),
            project_id: ProjectId(10),
            version_id: version.map(VersionId),
            parent_id: None,
            subject: "test".to_string(),
            status: "New".to_string(),
            estimated_hours: None,
            assignee: None,
            due_date: due.map(|d| d.parse().unwrap()),
            first_seen_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn milestone() -> TargetRange {
        TargetRange::Milestone(Version {
            id: VersionId(7),
            project_id: ProjectId(10),
            name: "v1.0".to_string(),
            start_date: Some("2026-03-02".parse().unwrap()),
            due_date: Some("2026-03-31".parse().unwrap()),
        })
    }

    #[test]
    fn milestone_membership_is_version_match() {
        let range = milestone();
        assert!(range.contains(&issue(Some(7), None)));
        assert!(!range.contains(&issue(Some(8), None)));
        assert!(!range.contains(&issue(None, None)));
    }

    #[test]
    fn due_date_cut_membership_is_inclusive_bound() {
        let range = TargetRange::DueDateCut {
            project_id: ProjectId(10),
            due_date: "2026-06-30".parse().unwrap(),
            name: "Release-2026-06-30".to_string(),
        };
        assert!(range.contains(&issue(None, Some("2026-06-30"))));
        assert!(range.contains(&issue(None, Some("2026-05-01"))));
        assert!(!range.contains(&issue(None, Some("2026-07-01"))));
        assert!(!range.contains(&issue(None, None)));
    }

    #[test]
    fn due_date_cut_starts_at_first_snapshot() {
        let range = TargetRange::DueDateCut {
            project_id: ProjectId(10),
            due_date: "2026-06-30".parse().unwrap(),
            name: "Release-2026-06-30".to_string(),
        };
        let mut meta = RangeMeta::default();
        assert_eq!(range.start_date(&meta), None);
        meta.first_snapshot_date = Some("2026-06-01".parse().unwrap());
        assert_eq!(range.start_date(&meta), Some("2026-06-01".parse().unwrap()));
    }

    #[test]
    fn keys_distinguish_range_kinds() {
        assert_eq!(milestone().key(), "version:7");
        let cut = TargetRange::DueDateCut {
            project_id: ProjectId(10),
            due_date: "2026-06-30".parse().unwrap(),
            name: "June".to_string(),
        };
        assert_eq!(cut.key(), "release:2026-06-30");
    }
}
