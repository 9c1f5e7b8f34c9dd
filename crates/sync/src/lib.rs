//! Tracker synchronization for rdburn.
//!
//! Fetches issues, journals, versions, and statuses from the remote
//! tracker and mirrors them into the store as current state, first-seen
//! baselines, and the typed append-only change journal.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod service;

pub use client::{
    DetailDto, IdDto, IssueDto, IssuePage, IssueQuery, JournalDto, ProjectDto, RedmineClient,
    RefDto, StatusDto, TrackerClient, VersionDto,
};
pub use error::{Result, SyncError};
pub use service::{SyncReport, SyncService};
