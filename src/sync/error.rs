//! Errors surfaced by the synchronizer

use thiserror::Error;

/// Every error here is scoped to one room session; none is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A change event could not be decoded. It was dropped.
    #[error("malformed event dropped: {0}")]
    Decode(String),

    /// The backend stream for a room failed. The feed stays frozen at its
    /// last good snapshot until the next room switch.
    #[error("subscription to room '{room}' failed: {reason}")]
    Subscription { room: String, reason: String },

    /// Rejected locally, before any network call.
    #[error("{0}")]
    Validation(String),

    /// The backend rejected or failed a send.
    #[error("send to room '{room}' failed: {reason}")]
    Write { room: String, reason: String },
}
