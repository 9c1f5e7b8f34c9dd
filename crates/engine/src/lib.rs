//! Aggregation and snapshot engine.
//!
//! The batch pipeline that turns a synced issue mirror and its change
//! journal into a daily burndown series: historical reconstruction,
//! hierarchical effort rollup, per-day snapshot computation, and velocity
//! derivation with forward projections. Results are bit-identical whether a
//! day is computed live or replayed from history later.

#![warn(missing_docs)]

pub mod calendar;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod replay;
pub mod snapshot;
pub mod velocity;

pub use calendar::BusinessCalendar;
pub use error::EngineError;
pub use hierarchy::{resolve, AssigneeShare, ResolvedRoot, Resolution, RollupWarning};
pub use history::{state_at, HistoryCursor};
pub use replay::{replay_range, ReplayRequest, ReplaySummary};
pub use snapshot::{compute_day, DayOutcome, SnapshotDay};
pub use velocity::{
    forecast, project, summarize, Forecast, OutlierFilter, Projection, VelocitySummary,
};
