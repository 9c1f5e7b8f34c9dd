//! SQLite store backend for rdburn.
//!
//! One database file holds the synced issue mirror (current state +
//! first-seen baselines), the append-only change journal, and the computed
//! snapshot tables.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use rdburn_core::{
    Assignee, AssigneeSnapshot, ChangeRecord, DailySnapshot, FieldChange, Issue, IssueId,
    ProjectId, RangeMeta, Time, UserId, Version, VersionId,
};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use super::trait_::{Result, Store, StoreError};

/// SQLite store implementation.
#[derive(Clone)]
pub struct SqliteStore {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Create an in-memory store for testing.
    pub async fn in_memory() -> Result<Self> {
        // a single connection keeps every query on the same :memory: db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS versions (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                start_date TEXT,
                due_date TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        for table in ["issues", "issue_baselines"] {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    project_id INTEGER NOT NULL,
                    version_id INTEGER,
                    parent_id INTEGER,
                    subject TEXT NOT NULL,
                    status_name TEXT NOT NULL,
                    estimated_hours REAL,
                    assigned_to_id INTEGER,
                    assigned_to_name TEXT,
                    due_date TEXT,
                    first_seen_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )"
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS issue_journals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_id INTEGER NOT NULL,
                at TEXT NOT NULL,
                field TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT,
                UNIQUE (issue_id, at, field)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                date TEXT NOT NULL,
                target TEXT NOT NULL,
                scope_hours REAL NOT NULL DEFAULT 0,
                remaining_hours REAL NOT NULL DEFAULT 0,
                completed_hours REAL NOT NULL DEFAULT 0,
                ideal_remaining_hours REAL NOT NULL DEFAULT 0,
                burn_hours REAL,
                v_avg REAL NOT NULL DEFAULT 0,
                v_max REAL NOT NULL DEFAULT 0,
                v_min REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (date, target)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS assignee_snapshots (
                date TEXT NOT NULL,
                target TEXT NOT NULL,
                assigned_to_id INTEGER,
                assigned_to_name TEXT,
                scope_hours REAL NOT NULL DEFAULT 0,
                remaining_hours REAL NOT NULL DEFAULT 0,
                completed_hours REAL NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_issues_project_id ON issues (project_id)",
            "CREATE INDEX IF NOT EXISTS idx_issues_version_id ON issues (version_id)",
            "CREATE INDEX IF NOT EXISTS idx_issues_parent_id ON issues (parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_issue_journals_issue_id ON issue_journals (issue_id)",
            "CREATE INDEX IF NOT EXISTS idx_issue_journals_at ON issue_journals (at)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_target ON snapshots (target)",
            "CREATE INDEX IF NOT EXISTS idx_assignee_snapshots_day ON assignee_snapshots (target, date)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn upsert_issue_row(&self, table: &str, issue: &Issue, or_ignore: bool) -> Result<u64> {
        let verb = if or_ignore { "INSERT OR IGNORE" } else { "INSERT OR REPLACE" };
        let result = sqlx::query(&format!(
            "{verb} INTO {table} (
                id, project_id, version_id, parent_id, subject, status_name,
                estimated_hours, assigned_to_id, assigned_to_name, due_date,
                first_seen_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(issue.id.0)
        .bind(issue.project_id.0)
        .bind(issue.version_id.map(|v| v.0))
        .bind(issue.parent_id.map(|p| p.0))
        .bind(&issue.subject)
        .bind(&issue.status)
        .bind(issue.estimated_hours)
        .bind(issue.assignee.as_ref().map(|a| a.id.0))
        .bind(issue.assignee.as_ref().map(|a| a.name.as_str()))
        .bind(issue.due_date)
        .bind(issue.first_seen_at)
        .bind(issue.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn load_issue_rows(&self, table: &str, project: ProjectId) -> Result<Vec<Issue>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {table} WHERE project_id = ? ORDER BY id"
        ))
        .bind(project.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(issue_from_row).collect()
    }

    async fn load_meta_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("value")).transpose().map_err(Into::into)
    }

    async fn save_meta_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_version(&mut self, version: &Version) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO versions (id, project_id, name, start_date, due_date)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(version.id.0)
        .bind(version.project_id.0)
        .bind(&version.name)
        .bind(version.start_date)
        .bind(version.due_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_version(&self, project: ProjectId, name: &str) -> Result<Option<Version>> {
        let row = sqlx::query("SELECT * FROM versions WHERE project_id = ? AND name = ?")
            .bind(project.0)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Version {
                id: VersionId(row.try_get("id")?),
                project_id: ProjectId(row.try_get("project_id")?),
                name: row.try_get("name")?,
                start_date: row.try_get("start_date")?,
                due_date: row.try_get("due_date")?,
            })
        })
        .transpose()
    }

    async fn upsert_issue(&mut self, issue: &Issue) -> Result<()> {
        self.upsert_issue_row("issues", issue, false).await?;
        Ok(())
    }

    async fn load_issues(&self, project: ProjectId) -> Result<Vec<Issue>> {
        self.load_issue_rows("issues", project).await
    }

    async fn insert_baseline(&mut self, issue: &Issue) -> Result<()> {
        self.upsert_issue_row("issue_baselines", issue, true).await?;
        Ok(())
    }

    async fn load_baselines(&self, project: ProjectId) -> Result<Vec<Issue>> {
        self.load_issue_rows("issue_baselines", project).await
    }

    async fn append_changes(&mut self, records: &[ChangeRecord]) -> Result<usize> {
        let mut inserted = 0;
        for record in records {
            let (field, old_value, new_value) = encode_change(&record.change)?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO issue_journals (issue_id, at, field, old_value, new_value)
                VALUES (?, ?, ?, ?, ?)",
            )
            .bind(record.issue_id.0)
            .bind(record.at)
            .bind(field)
            .bind(old_value)
            .bind(new_value)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        debug!(appended = inserted, offered = records.len(), "journal append");
        Ok(inserted)
    }

    async fn load_journal(&self, project: ProjectId) -> Result<Vec<ChangeRecord>> {
        let rows = sqlx::query(
            "SELECT j.id, j.issue_id, j.at, j.field, j.old_value, j.new_value
            FROM issue_journals j
            JOIN issues i ON i.id = j.issue_id
            WHERE i.project_id = ?
            ORDER BY j.at, j.id",
        )
        .bind(project.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let field: String = row.try_get("field")?;
                let old_value: Option<String> = row.try_get("old_value")?;
                let new_value: Option<String> = row.try_get("new_value")?;
                Ok(ChangeRecord {
                    issue_id: IssueId(row.try_get("issue_id")?),
                    at: row.try_get("at")?,
                    seq: row.try_get("id")?,
                    change: decode_change(&field, old_value.as_deref(), new_value.as_deref())?,
                })
            })
            .collect()
    }

    async fn load_snapshot(&self, target: &str, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let row = sqlx::query("SELECT * FROM snapshots WHERE target = ? AND date = ?")
            .bind(target)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn load_snapshots(&self, target: &str) -> Result<Vec<DailySnapshot>> {
        let rows = sqlx::query("SELECT * FROM snapshots WHERE target = ? ORDER BY date")
            .bind(target)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn load_assignee_day(
        &self,
        target: &str,
        date: NaiveDate,
    ) -> Result<Vec<AssigneeSnapshot>> {
        let rows = sqlx::query(
            "SELECT * FROM assignee_snapshots WHERE target = ? AND date = ?
            ORDER BY assigned_to_id IS NOT NULL, assigned_to_id",
        )
        .bind(target)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let assigned_id: Option<i64> = row.try_get("assigned_to_id")?;
                let assigned_name: Option<String> = row.try_get("assigned_to_name")?;
                let assignee = match (assigned_id, assigned_name) {
                    (Some(id), Some(name)) => Some(Assignee { id: UserId(id), name }),
                    (None, None) => None,
                    _ => {
                        return Err(StoreError::Corrupt(
                            "assignee snapshot row has a half-set assignee".to_string(),
                        ))
                    }
                };
                Ok(AssigneeSnapshot {
                    date: row.try_get("date")?,
                    assignee,
                    scope_hours: row.try_get("scope_hours")?,
                    remaining_hours: row.try_get("remaining_hours")?,
                    completed_hours: row.try_get("completed_hours")?,
                })
            })
            .collect()
    }

    async fn save_day(
        &mut self,
        target: &str,
        snapshot: &DailySnapshot,
        assignees: &[AssigneeSnapshot],
        meta: &RangeMeta,
        overwrite: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if overwrite {
            sqlx::query("DELETE FROM snapshots WHERE target = ? AND date = ?")
                .bind(target)
                .bind(snapshot.date)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM assignee_snapshots WHERE target = ? AND date = ?")
                .bind(target)
                .bind(snapshot.date)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO snapshots (
                date, target, scope_hours, remaining_hours, completed_hours,
                ideal_remaining_hours, burn_hours, v_avg, v_max, v_min
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot.date)
        .bind(target)
        .bind(snapshot.scope_hours)
        .bind(snapshot.remaining_hours)
        .bind(snapshot.completed_hours)
        .bind(snapshot.ideal_remaining_hours)
        .bind(snapshot.burn_hours)
        .bind(snapshot.v_avg)
        .bind(snapshot.v_max)
        .bind(snapshot.v_min)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, target, snapshot.date))?;

        for row in assignees {
            sqlx::query(
                "INSERT INTO assignee_snapshots (
                    date, target, assigned_to_id, assigned_to_name,
                    scope_hours, remaining_hours, completed_hours
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.date)
            .bind(target)
            .bind(row.assignee.as_ref().map(|a| a.id.0))
            .bind(row.assignee.as_ref().map(|a| a.name.as_str()))
            .bind(row.scope_hours)
            .bind(row.remaining_hours)
            .bind(row.completed_hours)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
            .bind(format!("range:{target}"))
            .bind(serde_json::to_string(meta)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_meta(&self, target: &str) -> Result<RangeMeta> {
        match self.load_meta_value(&format!("range:{target}")).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(RangeMeta::default()),
        }
    }

    async fn sync_horizon(&self, project: ProjectId) -> Result<Option<Time>> {
        match self.load_meta_value(&format!("synced:{project}")).await? {
            Some(raw) => {
                let at = chrono::DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| StoreError::Corrupt(format!("sync horizon: {e}")))?;
                Ok(Some(at.with_timezone(&chrono::Utc)))
            }
            None => Ok(None),
        }
    }

    async fn set_sync_horizon(&mut self, project: ProjectId, at: Time) -> Result<()> {
        self.save_meta_value(&format!("synced:{project}"), &at.to_rfc3339())
            .await
    }

    async fn project_id(&self, identifier: &str) -> Result<Option<ProjectId>> {
        match self.load_meta_value(&format!("project:{identifier}")).await? {
            Some(raw) => raw
                .parse()
                .map(|id| Some(ProjectId(id)))
                .map_err(|e| StoreError::Corrupt(format!("project id: {e}"))),
            None => Ok(None),
        }
    }

    async fn set_project_id(&mut self, identifier: &str, project: ProjectId) -> Result<()> {
        self.save_meta_value(&format!("project:{identifier}"), &project.to_string())
            .await
    }
}

fn conflict_on_unique(error: sqlx::Error, target: &str, date: NaiveDate) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            target: target.to_string(),
            date,
        },
        _ => StoreError::Db(error),
    }
}

fn decode_assignee(
    issue_id: i64,
    id: Option<i64>,
    name: Option<String>,
) -> Result<Option<Assignee>> {
    match (id, name) {
        (Some(id), Some(name)) => Ok(Some(Assignee { id: UserId(id), name })),
        (None, None) => Ok(None),
        _ => Err(StoreError::HalfAssignee { issue_id }),
    }
}

fn issue_from_row(row: &SqliteRow) -> Result<Issue> {
    let issue_id: i64 = row.try_get("id")?;
    let assigned_id: Option<i64> = row.try_get("assigned_to_id")?;
    let assigned_name: Option<String> = row.try_get("assigned_to_name")?;

    Ok(Issue {
        id: IssueId(issue_id),
        project_id: ProjectId(row.try_get("project_id")?),
        version_id: row.try_get::<Option<i64>, _>("version_id")?.map(VersionId),
        parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(IssueId),
        subject: row.try_get("subject")?,
        status: row.try_get("status_name")?,
        estimated_hours: row.try_get("estimated_hours")?,
        assignee: decode_assignee(issue_id, assigned_id, assigned_name)?,
        due_date: row.try_get("due_date")?,
        first_seen_at: row.try_get("first_seen_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<DailySnapshot> {
    Ok(DailySnapshot {
        date: row.try_get("date")?,
        scope_hours: row.try_get("scope_hours")?,
        remaining_hours: row.try_get("remaining_hours")?,
        completed_hours: row.try_get("completed_hours")?,
        ideal_remaining_hours: row.try_get("ideal_remaining_hours")?,
        burn_hours: row.try_get("burn_hours")?,
        v_avg: row.try_get("v_avg")?,
        v_max: row.try_get("v_max")?,
        v_min: row.try_get("v_min")?,
    })
}

fn encode_change(change: &FieldChange) -> Result<(&'static str, Option<String>, Option<String>)> {
    let (old_value, new_value) = match change {
        FieldChange::Estimate { from, to } => (opt_json(from)?, opt_json(to)?),
        FieldChange::Status { from, to } => (
            Some(serde_json::to_string(from)?),
            Some(serde_json::to_string(to)?),
        ),
        FieldChange::Version { from, to } => (opt_json(from)?, opt_json(to)?),
        FieldChange::Assignee { from, to } => (opt_json(from)?, opt_json(to)?),
        FieldChange::DueDate { from, to } => (opt_json(from)?, opt_json(to)?),
    };
    Ok((change.field(), old_value, new_value))
}

fn decode_change(field: &str, old: Option<&str>, new: Option<&str>) -> Result<FieldChange> {
    Ok(match field {
        "estimated_hours" => FieldChange::Estimate { from: opt_parse(old)?, to: opt_parse(new)? },
        "status" => FieldChange::Status {
            from: required(old, field)?,
            to: required(new, field)?,
        },
        "version" => FieldChange::Version { from: opt_parse(old)?, to: opt_parse(new)? },
        "assignee" => FieldChange::Assignee { from: opt_parse(old)?, to: opt_parse(new)? },
        "due_date" => FieldChange::DueDate { from: opt_parse(old)?, to: opt_parse(new)? },
        other => return Err(StoreError::Corrupt(format!("unknown journal field '{other}'"))),
    })
}

fn opt_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn opt_parse<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>> {
    raw.map(serde_json::from_str).transpose().map_err(Into::into)
}

fn required<T: DeserializeOwned>(raw: Option<&str>, field: &str) -> Result<T> {
    opt_parse(raw)?.ok_or_else(|| StoreError::Corrupt(format!("missing {field} journal value")))
}
