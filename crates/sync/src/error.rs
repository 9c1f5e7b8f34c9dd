//! Sync error taxonomy.

use rdburn_storage::StoreError;

/// Error type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while talking to the tracker or persisting the
/// mirror.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport or decode failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the tracker
    #[error("tracker returned HTTP {status} for {url}")]
    Api {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The named version does not exist in the project
    #[error("version '{0}' not found")]
    VersionNotFound(String),

    /// An assignee reference with an id but no display name
    #[error("issue #{issue_id}: assignee reference is missing its name")]
    HalfAssignee {
        /// Offending issue
        issue_id: i64,
    },

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}
