//! Change journal - append-only facts about issue field transitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{IssueId, VersionId};
use crate::issue::Assignee;

/// One immutable journal fact: a single field of a single issue changed.
///
/// Records are created once when the sync layer observes a diff and never
/// mutated or deleted afterwards. Reconstruction of any past day's state is
/// a pure function of the ordered records up to a cutoff plus each issue's
/// first-seen baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Issue the change applies to
    pub issue_id: IssueId,

    /// Effective instant of the change
    pub at: DateTime<Utc>,

    /// Insertion order; breaks ties between records sharing `at`
    pub seq: i64,

    /// The field transition
    pub change: FieldChange,
}

impl ChangeRecord {
    /// Replay ordering key: timestamp, then insertion order.
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.at, self.seq)
    }
}

/// Typed old/new payload for each tracked field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldChange {
    /// Estimated hours changed
    Estimate {
        /// Value before the change
        from: Option<f64>,
        /// Value after the change
        to: Option<f64>,
    },

    /// Status name changed
    Status {
        /// Status before the change
        from: String,
        /// Status after the change
        to: String,
    },

    /// Target-range membership (version) changed
    Version {
        /// Version before the change
        from: Option<VersionId>,
        /// Version after the change
        to: Option<VersionId>,
    },

    /// Assignee changed
    Assignee {
        /// Assignee before the change
        from: Option<Assignee>,
        /// Assignee after the change
        to: Option<Assignee>,
    },

    /// Due date changed
    DueDate {
        /// Due date before the change
        from: Option<NaiveDate>,
        /// Due date after the change
        to: Option<NaiveDate>,
    },
}

impl FieldChange {
    /// Stable field label; part of the journal row uniqueness key.
    pub fn field(&self) -> &'static str {
        match self {
            FieldChange::Estimate { .. } => "estimated_hours",
            FieldChange::Status { .. } => "status",
            FieldChange::Version { .. } => "version",
            FieldChange::Assignee { .. } => "assignee",
            FieldChange::DueDate { .. } => "due_date",
        }
    }
}
