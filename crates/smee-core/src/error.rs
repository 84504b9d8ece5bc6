//! Error types shared across the Smee workspace.

use thiserror::Error;

/// Errors that can occur in the alert-management core.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced issue is not in the resident set.
    ///
    /// May be legitimate: a concurrent apply can close and evict the issue
    /// between a caller's lookup and its mutation.
    #[error("issue not found: {id}")]
    IssueNotFound {
        /// The issue ID that was not found.
        id: String,
    },

    /// Referenced alert does not exist on the issue.
    #[error("alert {alert_id} not found on issue {issue_id}")]
    AlertNotFound {
        /// The issue the alert was expected on.
        issue_id: String,
        /// The alert ID that was not found.
        alert_id: String,
    },

    /// No active issue exists for the room.
    #[error("no active issue for room: {room_id}")]
    RoomIssueNotFound {
        /// The room without an active issue.
        room_id: String,
    },

    /// The telemetry stream failed or closed.
    #[error("event stream failed: {reason}")]
    Stream {
        /// The reason the stream failed.
        reason: String,
    },

    /// The device-state query service could not be reached or errored.
    #[error("state query failed: {reason}")]
    StateQuery {
        /// The reason the query failed.
        reason: String,
    },

    /// A persistent backing or incident collaborator call failed.
    #[error("store operation failed: {reason}")]
    Store {
        /// The reason the store call failed.
        reason: String,
    },

    /// Invalid alert rule configuration.
    #[error("invalid alert rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// Serialization/deserialization error in an audit payload.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true for the not-found family of errors.
    ///
    /// The matcher and reconciliation loops treat these as "nothing to do"
    /// rather than failures.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::IssueNotFound { .. }
                | Self::AlertNotFound { .. }
                | Self::RoomIssueNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
