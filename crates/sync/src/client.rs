//! Tracker REST client.
//!
//! [`TrackerClient`] is the seam the sync service talks through;
//! [`RedmineClient`] is the reqwest implementation against the Redmine API.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rdburn_core::{IssueId, VersionId};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, SyncError};

/// Project payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDto {
    /// Tracker id
    pub id: i64,
    /// Display name
    pub name: String,
    /// URL identifier
    pub identifier: String,
}

/// An id+name reference embedded in other payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct RefDto {
    /// Referenced id
    pub id: i64,
    /// Referenced display name; some references omit it
    #[serde(default)]
    pub name: String,
}

/// A bare id reference (parent links carry no name).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IdDto {
    /// Referenced id
    pub id: i64,
}

/// Issue payload, journals included when fetched individually.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueDto {
    /// Tracker id
    pub id: i64,
    /// Owning project
    pub project: RefDto,
    /// Parent issue, if any
    #[serde(default)]
    pub parent: Option<IdDto>,
    /// Version membership, if any
    #[serde(default)]
    pub fixed_version: Option<RefDto>,
    /// Issue title
    pub subject: String,
    /// Current status
    pub status: RefDto,
    /// Estimated hours
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    /// Current assignee
    #[serde(default)]
    pub assigned_to: Option<RefDto>,
    /// Due date
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Creation instant
    pub created_on: DateTime<Utc>,
    /// Last update instant
    pub updated_on: DateTime<Utc>,
    /// Change history; empty on list responses
    #[serde(default)]
    pub journals: Vec<JournalDto>,
}

/// One journal entry: a batch of field changes sharing a timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct JournalDto {
    /// Effective instant of the entry
    pub created_on: DateTime<Utc>,
    /// Individual field transitions
    #[serde(default)]
    pub details: Vec<DetailDto>,
}

/// One field transition inside a journal entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailDto {
    /// Change category; attribute changes carry "attr"
    pub property: String,
    /// Field name
    pub name: String,
    /// Raw value before the change
    #[serde(default)]
    pub old_value: Option<String>,
    /// Raw value after the change
    #[serde(default)]
    pub new_value: Option<String>,
}

/// Version (milestone) payload.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionDto {
    /// Tracker id
    pub id: i64,
    /// Version name
    pub name: String,
    /// Committed due date
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Creation instant; stands in as the milestone start
    pub created_on: DateTime<Utc>,
}

/// Issue status payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusDto {
    /// Tracker id
    pub id: i64,
    /// Status name
    pub name: String,
}

/// One page of an issue listing.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePage {
    /// Issues on this page
    pub issues: Vec<IssueDto>,
    /// Total matching issues across all pages
    pub total_count: u32,
}

/// Parameters of one issue listing call.
#[derive(Debug, Clone)]
pub struct IssueQuery<'a> {
    /// Project identifier
    pub project: &'a str,
    /// Restrict to one version
    pub version: Option<VersionId>,
    /// Restrict to issues updated at or after this instant
    pub updated_after: Option<DateTime<Utc>>,
    /// Page offset
    pub offset: u32,
    /// Page size
    pub limit: u32,
}

/// The remote issue-tracker interface the sync service depends on.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Fetch one project by identifier.
    async fn get_project(&self, identifier: &str) -> Result<ProjectDto>;

    /// Fetch a project's versions.
    async fn get_versions(&self, identifier: &str) -> Result<Vec<VersionDto>>;

    /// Fetch the status id → name table.
    async fn get_statuses(&self) -> Result<Vec<StatusDto>>;

    /// List issues, one page at a time (journals not included).
    async fn list_issues(&self, query: IssueQuery<'_>) -> Result<IssuePage>;

    /// Fetch one issue with its full journal history.
    async fn get_issue(&self, id: IssueId) -> Result<IssueDto>;
}

#[derive(Debug, Deserialize)]
struct ProjectWrap {
    project: ProjectDto,
}

#[derive(Debug, Deserialize)]
struct VersionsWrap {
    versions: Vec<VersionDto>,
}

#[derive(Debug, Deserialize)]
struct StatusesWrap {
    issue_statuses: Vec<StatusDto>,
}

#[derive(Debug, Deserialize)]
struct IssueWrap {
    issue: IssueDto,
}

/// Redmine HTTP client.
pub struct RedmineClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RedmineClient {
    /// Build a client for one Redmine instance.
    pub fn new(base_url: &str, api_key: Option<String>, timeout_sec: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_sec))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-Redmine-API-Key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Api { status: response.status().as_u16(), url });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TrackerClient for RedmineClient {
    async fn get_project(&self, identifier: &str) -> Result<ProjectDto> {
        let wrap: ProjectWrap = self
            .get_json(&format!("projects/{identifier}.json"), &[])
            .await?;
        Ok(wrap.project)
    }

    async fn get_versions(&self, identifier: &str) -> Result<Vec<VersionDto>> {
        let wrap: VersionsWrap = self
            .get_json(&format!("projects/{identifier}/versions.json"), &[])
            .await?;
        Ok(wrap.versions)
    }

    async fn get_statuses(&self) -> Result<Vec<StatusDto>> {
        let wrap: StatusesWrap = self.get_json("issue_statuses.json", &[]).await?;
        Ok(wrap.issue_statuses)
    }

    async fn list_issues(&self, query: IssueQuery<'_>) -> Result<IssuePage> {
        let mut params = vec![
            ("project_id", query.project.to_string()),
            ("status_id", "*".to_string()),
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(version) = query.version {
            params.push(("fixed_version_id", version.to_string()));
        }
        if let Some(after) = query.updated_after {
            params.push(("updated_on", format!(">={}", after.to_rfc3339())));
        }
        self.get_json("issues.json", &params).await
    }

    async fn get_issue(&self, id: IssueId) -> Result<IssueDto> {
        let wrap: IssueWrap = self
            .get_json(
                &format!("issues/{id}.json"),
                &[("include", "journals,children".to_string())],
            )
            .await?;
        Ok(wrap.issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_payload_parses_with_optional_fields_missing() {
        let raw = r#"{
            "id": 101,
            "project": {"id": 10, "name": "Backend"},
            "subject": "Implement login",
            "status": {"id": 1, "name": "New"},
            "created_on": "2026-03-01T09:00:00Z",
            "updated_on": "2026-03-02T10:00:00Z"
        }"#;
        let dto: IssueDto = serde_json::from_str(raw).unwrap();
        assert_eq!(dto.id, 101);
        assert!(dto.parent.is_none());
        assert!(dto.estimated_hours.is_none());
        assert!(dto.journals.is_empty());
    }

    #[test]
    fn journal_details_parse_null_values() {
        let raw = r#"{
            "created_on": "2026-03-02T10:00:00Z",
            "details": [
                {"property": "attr", "name": "estimated_hours", "old_value": null, "new_value": "8.0"},
                {"property": "attr", "name": "status_id", "old_value": "1", "new_value": "5"}
            ]
        }"#;
        let dto: JournalDto = serde_json::from_str(raw).unwrap();
        assert_eq!(dto.details.len(), 2);
        assert_eq!(dto.details[0].old_value, None);
        assert_eq!(dto.details[0].new_value.as_deref(), Some("8.0"));
    }

    #[test]
    fn version_due_date_parses_as_civil_date() {
        let raw = r#"{
            "id": 7,
            "name": "v1.0",
            "due_date": "2026-03-31",
            "created_on": "2026-02-01T00:00:00Z"
        }"#;
        let dto: VersionDto = serde_json::from_str(raw).unwrap();
        assert_eq!(dto.due_date, Some("2026-03-31".parse().unwrap()));
    }
}
