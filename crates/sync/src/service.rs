//! Issue and journal synchronization.
//!
//! Mirrors the tracker into the store: current issue state, first-seen
//! baselines (rewound through journal `old_value`s), and the typed change
//! journal the historical reconstructor replays. Appends are idempotent, so
//! re-running a sync never duplicates history.

use std::collections::HashMap;

use chrono::Utc;
use rdburn_core::{
    Assignee, ChangeRecord, FieldChange, Issue, IssueId, ProjectId, UserId, Version, VersionId,
};
use rdburn_storage::Store;
use tracing::info;

use crate::client::{DetailDto, IssueDto, IssueQuery, TrackerClient, VersionDto};
use crate::error::{Result, SyncError};

const PAGE_SIZE: u32 = 100;

/// What one sync run did.
#[derive(Debug)]
pub struct SyncReport {
    /// Synced project
    pub project_id: ProjectId,

    /// Resolved version when a milestone was named
    pub version: Option<Version>,

    /// Issues fetched and mirrored
    pub issues_synced: usize,

    /// Journal records newly appended
    pub journals_appended: usize,

    /// Non-fatal oddities (unknown status ids, unresolvable user names)
    pub warnings: Vec<String>,
}

/// Tracker-to-store synchronization service.
pub struct SyncService<C> {
    client: C,
}

impl<C: TrackerClient> SyncService<C> {
    /// Create a new sync service over a tracker client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Mirror a project (optionally narrowed to one version) into the
    /// store. `full` ignores the incremental watermark and refetches
    /// everything.
    pub async fn sync_project<S: Store + ?Sized>(
        &self,
        store: &mut S,
        identifier: &str,
        version_name: Option<&str>,
        full: bool,
    ) -> Result<SyncReport> {
        // the journal is complete through the instant the fetch began
        let started_at = Utc::now();

        let project = self.client.get_project(identifier).await?;
        let project_id = ProjectId(project.id);
        store.set_project_id(identifier, project_id).await?;

        let version = match version_name {
            Some(name) => Some(self.sync_version(store, project_id, identifier, name).await?),
            None => None,
        };

        let statuses: HashMap<i64, String> = self
            .client
            .get_statuses()
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();

        let known: HashMap<IssueId, Issue> = store
            .load_issues(project_id)
            .await?
            .into_iter()
            .map(|issue| (issue.id, issue))
            .collect();
        let mut names: HashMap<UserId, String> = known
            .values()
            .filter_map(|issue| issue.assignee.clone())
            .map(|assignee| (assignee.id, assignee.name))
            .collect();

        let updated_after = if full { None } else { store.sync_horizon(project_id).await? };

        let mut issues_synced = 0;
        let mut journals_appended = 0;
        let mut warnings = Vec::new();
        let mut seq = 0;
        let mut offset = 0;
        loop {
            let page = self
                .client
                .list_issues(IssueQuery {
                    project: identifier,
                    version: version.as_ref().map(|v| v.id),
                    updated_after,
                    offset,
                    limit: PAGE_SIZE,
                })
                .await?;
            let fetched = page.issues.len() as u32;
            if fetched == 0 {
                break;
            }

            for listed in &page.issues {
                let detail = self.client.get_issue(IssueId(listed.id)).await?;
                if let Some(reference) = &detail.assigned_to {
                    if !reference.name.is_empty() {
                        names.insert(UserId(reference.id), reference.name.clone());
                    }
                }

                let issue = issue_from_dto(&detail)?;
                let changes =
                    changes_from_dto(&detail, &statuses, &names, &mut seq, &mut warnings);

                if !known.contains_key(&issue.id) {
                    store.insert_baseline(&derive_baseline(&issue, &changes)).await?;
                }
                store.upsert_issue(&issue).await?;
                journals_appended += store.append_changes(&changes).await?;
                issues_synced += 1;
            }

            offset += fetched;
            if offset >= page.total_count {
                break;
            }
        }

        store.set_sync_horizon(project_id, started_at).await?;
        info!(
            project = identifier,
            issues = issues_synced,
            journals = journals_appended,
            "sync complete"
        );

        Ok(SyncReport { project_id, version, issues_synced, journals_appended, warnings })
    }

    async fn sync_version<S: Store + ?Sized>(
        &self,
        store: &mut S,
        project_id: ProjectId,
        identifier: &str,
        name: &str,
    ) -> Result<Version> {
        let versions = self.client.get_versions(identifier).await?;
        let found = versions
            .into_iter()
            .find(|v| v.name == name || v.id.to_string() == name)
            .ok_or_else(|| SyncError::VersionNotFound(name.to_string()))?;
        let version = version_from_dto(&found, project_id);
        store.upsert_version(&version).await?;
        Ok(version)
    }
}

fn version_from_dto(dto: &VersionDto, project_id: ProjectId) -> Version {
    Version {
        id: VersionId(dto.id),
        project_id,
        name: dto.name.clone(),
        // the tracker carries no explicit start date; creation stands in
        start_date: Some(dto.created_on.date_naive()),
        due_date: dto.due_date,
    }
}

fn issue_from_dto(dto: &IssueDto) -> Result<Issue> {
    let assignee = match &dto.assigned_to {
        Some(reference) if reference.name.is_empty() => {
            return Err(SyncError::HalfAssignee { issue_id: dto.id })
        }
        Some(reference) => {
            Some(Assignee { id: UserId(reference.id), name: reference.name.clone() })
        }
        None => None,
    };

    Ok(Issue {
        id: IssueId(dto.id),
        project_id: ProjectId(dto.project.id),
        version_id: dto.fixed_version.as_ref().map(|v| VersionId(v.id)),
        parent_id: dto.parent.map(|p| IssueId(p.id)),
        subject: dto.subject.clone(),
        status: dto.status.name.clone(),
        estimated_hours: dto.estimated_hours,
        assignee,
        due_date: dto.due_date,
        first_seen_at: dto.created_on,
        updated_at: dto.updated_on,
    })
}

/// Translate journal entries into typed change records, skipping fields the
/// engine does not track.
fn changes_from_dto(
    dto: &IssueDto,
    statuses: &HashMap<i64, String>,
    names: &HashMap<UserId, String>,
    seq: &mut i64,
    warnings: &mut Vec<String>,
) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for journal in &dto.journals {
        for detail in &journal.details {
            if detail.property != "attr" {
                continue;
            }
            let Some(change) = field_change(detail, statuses, names, warnings) else {
                continue;
            };
            *seq += 1;
            records.push(ChangeRecord {
                issue_id: IssueId(dto.id),
                at: journal.created_on,
                seq: *seq,
                change,
            });
        }
    }
    records
}

fn field_change(
    detail: &DetailDto,
    statuses: &HashMap<i64, String>,
    names: &HashMap<UserId, String>,
    warnings: &mut Vec<String>,
) -> Option<FieldChange> {
    let old = detail.old_value.as_deref();
    let new = detail.new_value.as_deref();
    match detail.name.as_str() {
        "estimated_hours" => Some(FieldChange::Estimate {
            from: parse_value(old),
            to: parse_value(new),
        }),
        "status_id" => Some(FieldChange::Status {
            from: status_name(old, statuses, warnings),
            to: status_name(new, statuses, warnings),
        }),
        "fixed_version_id" => Some(FieldChange::Version {
            from: parse_value::<i64>(old).map(VersionId),
            to: parse_value::<i64>(new).map(VersionId),
        }),
        "assigned_to_id" => Some(FieldChange::Assignee {
            from: user(old, names, warnings),
            to: user(new, names, warnings),
        }),
        "due_date" => Some(FieldChange::DueDate {
            from: parse_value(old),
            to: parse_value(new),
        }),
        _ => None,
    }
}

fn parse_value<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.filter(|s| !s.is_empty()).and_then(|s| s.parse().ok())
}

fn status_name(
    raw: Option<&str>,
    statuses: &HashMap<i64, String>,
    warnings: &mut Vec<String>,
) -> String {
    let Some(id) = parse_value::<i64>(raw) else {
        return String::new();
    };
    match statuses.get(&id) {
        Some(name) => name.clone(),
        None => {
            warnings.push(format!("unknown status id {id} in journal"));
            format!("status #{id}")
        }
    }
}

fn user(
    raw: Option<&str>,
    names: &HashMap<UserId, String>,
    warnings: &mut Vec<String>,
) -> Option<Assignee> {
    let id = UserId(parse_value(raw)?);
    let name = match names.get(&id) {
        Some(name) => name.clone(),
        None => {
            warnings.push(format!("no display name on record for user {id}"));
            format!("user #{id}")
        }
    };
    Some(Assignee { id, name })
}

/// Rewind each tracked field to its value before the earliest journal entry
/// touching it. Issues synced late in their life still reconstruct from
/// their true beginning.
fn derive_baseline(issue: &Issue, changes: &[ChangeRecord]) -> Issue {
    let mut baseline = issue.clone();
    baseline.updated_at = issue.first_seen_at;

    let mut earliest: HashMap<&'static str, &ChangeRecord> = HashMap::new();
    for record in changes {
        let entry = earliest.entry(record.change.field()).or_insert(record);
        if record.sort_key() < entry.sort_key() {
            *entry = record;
        }
    }
    for record in earliest.into_values() {
        match &record.change {
            FieldChange::Estimate { from, .. } => baseline.estimated_hours = *from,
            FieldChange::Status { from, .. } => baseline.status.clone_from(from),
            FieldChange::Version { from, .. } => baseline.version_id = *from,
            FieldChange::Assignee { from, .. } => baseline.assignee.clone_from(from),
            FieldChange::DueDate { from, .. } => baseline.due_date = *from,
        }
    }
    baseline
}
