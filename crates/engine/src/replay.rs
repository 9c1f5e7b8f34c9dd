//! Range replay: reconstruct, resolve, and snapshot one business day at a
//! time.
//!
//! The driver walks business days in order over a single history cursor
//! pass. Each day is computed from the previous day's *persisted* snapshot,
//! so an interrupted run resumes from the last committed date without any
//! in-process cache.

use chrono::{DateTime, NaiveDate, Utc};
use rdburn_core::{ChangeRecord, DoneSet, Issue, TargetRange};
use rdburn_storage::Store;
use tracing::{debug, info};

use crate::calendar::BusinessCalendar;
use crate::error::EngineError;
use crate::hierarchy::RollupWarning;
use crate::history::HistoryCursor;
use crate::snapshot::{self, SnapshotDay};
use crate::velocity::OutlierFilter;

/// Everything a replay needs besides the store.
pub struct ReplayRequest<'a> {
    /// Range to replay
    pub target: &'a TargetRange,

    /// First-observed field values per issue
    pub baselines: Vec<Issue>,

    /// The full change journal for the project
    pub journal: Vec<ChangeRecord>,

    /// Completed-status names
    pub done: &'a DoneSet,

    /// Working-day calendar
    pub calendar: &'a BusinessCalendar,

    /// Optional outlier exclusion for velocity figures
    pub outlier: Option<OutlierFilter>,

    /// First day to consider; defaults to the range start date or, failing
    /// that, the first journal day
    pub from: Option<NaiveDate>,

    /// Last day to replay (inclusive)
    pub to: NaiveDate,

    /// Instant the journal is known-complete through
    pub synced_through: Option<DateTime<Utc>>,

    /// Recompute days that already have snapshots
    pub force: bool,
}

/// What a replay run did.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    /// Days computed and committed
    pub written: usize,

    /// Days skipped because a snapshot already existed
    pub skipped: usize,

    /// Rollup conflicts across all written days
    pub warnings: Vec<RollupWarning>,
}

/// Replay `target` through `req.to`, committing one day per transaction.
pub async fn replay_range<S: Store + ?Sized>(
    store: &mut S,
    req: ReplayRequest<'_>,
) -> Result<ReplaySummary, EngineError> {
    // refuse to reconstruct past what sync has actually captured; the one
    // exception is the horizon's own civil day, so a fresh sync can close
    // today intraday
    let covered = req.synced_through.is_some_and(|horizon| {
        req.calendar.end_of_day(req.to) <= horizon
            || req.calendar.civil_date(horizon) == req.to
    });
    if !covered {
        return Err(EngineError::ContinuityGap {
            date: req.to,
            synced_through: req
                .synced_through
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        });
    }

    let key = req.target.key();
    let meta = store.load_meta(&key).await?;
    let Some(start) = replay_start(&req, &meta) else {
        return Ok(ReplaySummary::default());
    };
    let days = req.calendar.working_days(start, req.to);

    // resume point: everything at or before the last persisted snapshot is
    // already done unless a forced recomputation was asked for
    let resume_after = if req.force { None } else { meta.last_snapshot_date };
    let Some(&first_day) = days
        .iter()
        .find(|&&date| resume_after.is_none_or(|last| date > last))
    else {
        let skipped = days.len();
        debug!(range = %req.target.name(), skipped, "nothing to replay");
        return Ok(ReplaySummary { skipped, ..ReplaySummary::default() });
    };

    // prior context comes from persisted rows only
    let history = store.load_snapshots(&key).await?;
    let mut previous = history.iter().rev().find(|s| s.date < first_day).cloned();
    let mut burns: Vec<f64> = history
        .iter()
        .filter(|s| s.date < first_day)
        .filter_map(|s| s.burn_hours)
        .collect();

    let mut cursor = HistoryCursor::new(req.baselines, req.journal);
    let mut meta = meta;
    let mut summary = ReplaySummary::default();

    for date in days {
        if date < first_day {
            summary.skipped += 1;
            continue;
        }
        let cutoff = req.calendar.end_of_day(date);
        cursor.advance_to(cutoff);
        let issues = cursor.state_in_range(req.target, cutoff);

        let day = SnapshotDay {
            target: req.target,
            date,
            previous: previous.as_ref(),
            meta: &meta,
            prior_burns: &burns,
            outlier: req.outlier,
        };
        let outcome = snapshot::compute_day(day, &issues, req.done, req.calendar)?;

        store
            .save_day(&key, &outcome.snapshot, &outcome.assignees, &outcome.meta, req.force)
            .await?;
        debug!(
            date = %date,
            scope = outcome.snapshot.scope_hours,
            remaining = outcome.snapshot.remaining_hours,
            burn = outcome.snapshot.burn_hours,
            "snapshot written"
        );

        burns.extend(outcome.snapshot.burn_hours);
        meta = outcome.meta;
        previous = Some(outcome.snapshot);
        summary.warnings.extend(outcome.warnings);
        summary.written += 1;
    }

    info!(
        range = %req.target.name(),
        written = summary.written,
        skipped = summary.skipped,
        "replay complete"
    );
    Ok(summary)
}

/// Where the replay window opens.
fn replay_start(req: &ReplayRequest<'_>, meta: &rdburn_core::RangeMeta) -> Option<NaiveDate> {
    req.from
        .or_else(|| req.target.start_date(meta))
        .or_else(|| req.journal.iter().map(|r| r.at.date_naive()).min())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rdburn_core::{FieldChange, IssueId, ProjectId, Version, VersionId};
    use rdburn_storage::{SqliteStore, StoreError};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    /// Mon 2026-03-02 .. due Fri 2026-03-06, four business days.
    fn milestone() -> TargetRange {
        TargetRange::Milestone(Version {
            id: VersionId(7),
            project_id: ProjectId(1),
            name: "v1.0".to_string(),
            start_date: Some(date("2026-03-02")),
            due_date: Some(date("2026-03-06")),
        })
    }

    fn baseline(id: i64, estimate: Option<f64>) -> Issue {
        Issue {
            id: IssueId(id),
            project_id: ProjectId(1),
            version_id: Some(VersionId(7)),
            parent_id: None,
            subject: format!("issue {id}"),
            status: "New".to_string(),
            estimated_hours: estimate,
            assignee: None,
            due_date: None,
            first_seen_at: ts(1, 8),
            updated_at: ts(1, 8),
        }
    }

    fn close(id: i64, day: u32, seq: i64) -> ChangeRecord {
        ChangeRecord {
            issue_id: IssueId(id),
            at: ts(day, 15),
            seq,
            change: FieldChange::Status { from: "New".into(), to: "Closed".into() },
        }
    }

    fn request<'a>(
        target: &'a TargetRange,
        done: &'a DoneSet,
        calendar: &'a BusinessCalendar,
        to: &str,
    ) -> ReplayRequest<'a> {
        ReplayRequest {
            target,
            baselines: vec![baseline(1, Some(8.0)), baseline(2, Some(32.0))],
            journal: vec![close(1, 2, 1), close(2, 4, 2)],
            done,
            calendar,
            outlier: None,
            from: None,
            to: date(to),
            synced_through: Some(ts(10, 0)),
            force: false,
        }
    }

    #[tokio::test]
    async fn replay_writes_one_snapshot_per_business_day() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        let summary = replay_range(&mut store, request(&target, &done, &calendar, "2026-03-05"))
            .await
            .unwrap();
        assert_eq!(summary.written, 4);

        let snaps = store.load_snapshots("version:7").await.unwrap();
        assert_eq!(snaps.len(), 4);
        // issue 1 (8h) closed on Mon the 2nd, issue 2 (32h) on Wed the 4th
        assert_eq!(snaps[0].remaining_hours, 32.0);
        assert_eq!(snaps[0].burn_hours, None);
        assert_eq!(snaps[1].remaining_hours, 32.0);
        assert_eq!(snaps[1].burn_hours, Some(0.0));
        assert_eq!(snaps[2].remaining_hours, 0.0);
        assert_eq!(snaps[2].burn_hours, Some(32.0));
        assert_eq!(snaps[3].remaining_hours, 0.0);
    }

    #[tokio::test]
    async fn interrupted_replay_resumes_after_the_last_committed_day() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        let first = replay_range(&mut store, request(&target, &done, &calendar, "2026-03-03"))
            .await
            .unwrap();
        assert_eq!((first.written, first.skipped), (2, 0));

        let second = replay_range(&mut store, request(&target, &done, &calendar, "2026-03-05"))
            .await
            .unwrap();
        assert_eq!((second.written, second.skipped), (2, 2));

        let snaps = store.load_snapshots("version:7").await.unwrap();
        assert_eq!(snaps.len(), 4);
        // the resumed days still see the earlier burn series
        assert_eq!(snaps[2].burn_hours, Some(32.0));
        assert_eq!(snaps[3].v_max, 32.0);
    }

    #[tokio::test]
    async fn resumed_replay_matches_a_single_uninterrupted_run() {
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        let mut one_shot = SqliteStore::in_memory().await.unwrap();
        replay_range(&mut one_shot, request(&target, &done, &calendar, "2026-03-05"))
            .await
            .unwrap();

        let mut resumed = SqliteStore::in_memory().await.unwrap();
        replay_range(&mut resumed, request(&target, &done, &calendar, "2026-03-02"))
            .await
            .unwrap();
        replay_range(&mut resumed, request(&target, &done, &calendar, "2026-03-05"))
            .await
            .unwrap();

        assert_eq!(
            one_shot.load_snapshots("version:7").await.unwrap(),
            resumed.load_snapshots("version:7").await.unwrap()
        );
    }

    #[tokio::test]
    async fn replay_refuses_dates_beyond_the_sync_horizon() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        let mut req = request(&target, &done, &calendar, "2026-03-05");
        req.synced_through = Some(ts(3, 0));
        let err = replay_range(&mut store, req).await.unwrap_err();
        assert!(matches!(err, EngineError::ContinuityGap { .. }));

        // refusal leaves nothing behind
        assert!(store.load_snapshots("version:7").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn the_sync_horizons_own_day_may_be_closed_intraday() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        // synced at 10:00 on the 5th; closing the 5th itself is allowed
        let mut req = request(&target, &done, &calendar, "2026-03-05");
        req.synced_through = Some(ts(5, 10));
        let summary = replay_range(&mut store, req).await.unwrap();
        assert_eq!(summary.written, 4);
    }

    #[tokio::test]
    async fn replay_refuses_when_never_synced() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        let mut req = request(&target, &done, &calendar, "2026-03-05");
        req.synced_through = None;
        let err = replay_range(&mut store, req).await.unwrap_err();
        match err {
            EngineError::ContinuityGap { synced_through, .. } => {
                assert_eq!(synced_through, "never");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn forced_replay_reproduces_identical_rows() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        replay_range(&mut store, request(&target, &done, &calendar, "2026-03-05"))
            .await
            .unwrap();
        let before = store.load_snapshots("version:7").await.unwrap();

        let mut req = request(&target, &done, &calendar, "2026-03-05");
        req.force = true;
        let summary = replay_range(&mut store, req).await.unwrap();
        assert_eq!(summary.written, 4);

        assert_eq!(store.load_snapshots("version:7").await.unwrap(), before);
    }

    #[tokio::test]
    async fn a_foreign_row_on_the_same_key_aborts_the_replay() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        // a row this run's meta knows nothing about (a concurrent writer)
        let foreign = rdburn_core::DailySnapshot {
            date: date("2026-03-02"),
            scope_hours: 1.0,
            remaining_hours: 1.0,
            completed_hours: 0.0,
            ideal_remaining_hours: 0.0,
            burn_hours: None,
            v_avg: 0.0,
            v_max: 0.0,
            v_min: 0.0,
        };
        store
            .save_day("version:7", &foreign, &[], &rdburn_core::RangeMeta::default(), false)
            .await
            .unwrap();

        let err = replay_range(&mut store, request(&target, &done, &calendar, "2026-03-05"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Conflict { .. })));
        // the conflicting day aborted before writing anything further
        assert_eq!(store.load_snapshots("version:7").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn due_date_cut_anchors_its_ideal_line_at_the_first_snapshot() {
        let mut store = SqliteStore::in_memory().await.unwrap();
        let target = TargetRange::DueDateCut {
            project_id: ProjectId(1),
            due_date: date("2026-03-06"),
            name: "Release-2026-03-06".to_string(),
        };
        let (done, calendar) = (DoneSet::new(["Closed"]), BusinessCalendar::default());

        let mut tracked = baseline(1, Some(12.0));
        tracked.version_id = None;
        tracked.due_date = Some(date("2026-03-05"));
        let mut beyond = baseline(2, Some(99.0));
        beyond.version_id = None;
        beyond.due_date = Some(date("2026-03-10"));

        let summary = replay_range(
            &mut store,
            ReplayRequest {
                target: &target,
                baselines: vec![tracked, beyond],
                journal: vec![],
                done: &done,
                calendar: &calendar,
                outlier: None,
                from: Some(date("2026-03-03")),
                to: date("2026-03-05"),
                synced_through: Some(ts(10, 0)),
                force: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.written, 3);

        let snaps = store.load_snapshots("release:2026-03-06").await.unwrap();
        // the 99h issue due after the cut never enters scope
        assert_eq!(snaps[0].scope_hours, 12.0);
        // D = 3 business days from the first snapshot to the due date
        assert_eq!(snaps[0].ideal_remaining_hours, 12.0);
        assert_eq!(snaps[1].ideal_remaining_hours, 8.0);
        assert_eq!(snaps[2].ideal_remaining_hours, 4.0);
    }

    #[tokio::test]
    async fn scope_churn_from_the_journal_flows_into_burn() {
        // an 8h issue joins the milestone on Wed while 8h of other work
        // closes: the two cancel and burn reads 0 for that day
        let mut store = SqliteStore::in_memory().await.unwrap();
        let (target, done, calendar) =
            (milestone(), DoneSet::new(["Closed"]), BusinessCalendar::default());

        let mut newcomer = baseline(3, Some(8.0));
        newcomer.version_id = None;

        let mut req = request(&target, &done, &calendar, "2026-03-05");
        req.baselines.push(newcomer);
        req.journal = vec![
            close(1, 4, 1),
            ChangeRecord {
                issue_id: IssueId(3),
                at: ts(4, 9),
                seq: 2,
                change: FieldChange::Version { from: None, to: Some(VersionId(7)) },
            },
        ];
        replay_range(&mut store, req).await.unwrap();

        let snaps = store.load_snapshots("version:7").await.unwrap();
        // Wed: scope 40 -> 48, remaining 40 -> 40
        assert_eq!(snaps[2].scope_hours, 48.0);
        assert_eq!(snaps[2].remaining_hours, 40.0);
        assert_eq!(snaps[2].burn_hours, Some(0.0));
    }
}
