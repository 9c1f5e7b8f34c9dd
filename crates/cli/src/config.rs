//! Configuration loading.
//!
//! Search order: an explicit `--config` path, `./rdburn.toml`, then
//! `~/.config/rdburn/config.toml`. `REDMINE_API_KEY` in the environment
//! overrides the file.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveDate, Weekday};
use rdburn_core::DoneSet;
use rdburn_engine::{BusinessCalendar, OutlierFilter};
use serde::Deserialize;

/// Whole configuration tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracker connection settings
    pub redmine: RedmineSection,
    /// Sprint and calendar settings
    pub sprint: SprintSection,
    /// Velocity derivation settings
    pub velocity: VelocitySection,
    /// Local database settings
    pub database: DatabaseSection,
}

/// `[redmine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedmineSection {
    /// Tracker base URL
    pub base_url: String,
    /// API key; `REDMINE_API_KEY` overrides
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_sec: u64,
    /// Default project identifier
    pub project: Option<String>,
    /// Default version name
    pub version: Option<String>,
}

impl Default for RedmineSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: None,
            timeout_sec: 15,
            project: None,
            version: None,
        }
    }
}

/// `[sprint]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SprintSection {
    /// Civil timezone as a fixed UTC offset, e.g. "+09:00"
    pub utc_offset: String,
    /// Status names that count as completed
    pub done_statuses: Vec<String>,
    /// Non-working weekdays
    pub non_working_weekdays: Vec<String>,
    /// Holiday dates
    pub holidays: Vec<NaiveDate>,
}

impl Default for SprintSection {
    fn default() -> Self {
        Self {
            utc_offset: "+00:00".to_string(),
            done_statuses: vec!["Closed".to_string(), "Resolved".to_string()],
            non_working_weekdays: vec!["Sat".to_string(), "Sun".to_string()],
            holidays: Vec::new(),
        }
    }
}

/// `[velocity]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VelocitySection {
    /// Apply the IQR fence before deriving pace figures
    pub exclude_outliers: bool,
    /// Fence factor k
    pub outlier_k: f64,
}

impl Default for VelocitySection {
    fn default() -> Self {
        Self { exclude_outliers: false, outlier_k: 1.5 }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite database path
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { path: PathBuf::from("rdburn.db") }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            _ => Config::default(),
        };

        if let Ok(key) = std::env::var("REDMINE_API_KEY") {
            if !key.is_empty() {
                config.redmine.api_key = Some(key);
            }
        }
        Ok(config)
    }

    /// The configured civil timezone.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.sprint
            .utc_offset
            .parse()
            .map_err(|e| anyhow!("invalid sprint.utc_offset '{}': {e}", self.sprint.utc_offset))
    }

    /// Build the business calendar from the sprint section.
    pub fn calendar(&self) -> Result<BusinessCalendar> {
        let weekend = self
            .sprint
            .non_working_weekdays
            .iter()
            .map(|raw| {
                raw.parse::<Weekday>()
                    .map_err(|_| anyhow!("invalid weekday '{raw}' in sprint.non_working_weekdays"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BusinessCalendar::new(
            weekend,
            self.sprint.holidays.iter().copied(),
            self.utc_offset()?,
        ))
    }

    /// Completed-status set.
    pub fn done_set(&self) -> DoneSet {
        DoneSet::new(self.sprint.done_statuses.iter().cloned())
    }

    /// Outlier filter, when enabled.
    pub fn outlier(&self) -> Option<OutlierFilter> {
        self.velocity
            .exclude_outliers
            .then(|| OutlierFilter { k: self.velocity.outlier_k })
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("rdburn.toml");
    if local.exists() {
        return Some(local);
    }
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".config/rdburn/config.toml"))
}
