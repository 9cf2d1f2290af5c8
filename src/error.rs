//! Errors that can happen during a reconciliation cycle

use std::error::Error;

use thiserror::Error;

/// The boxed error type returned by collaborators (note store, transport, state backend)
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors surfaced by this crate.
///
/// Per-task errors (everything but [`SyncError::Unauthorized`]) are counted and logged by the engine,
/// they never abort a cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure, timeout or unexpected HTTP status
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected our credentials, or is not reachable at all.
    /// This is a configuration error, fatal to the current cycle.
    #[error("server configuration error: {0}")]
    Unauthorized(String),

    /// The remote entry text could not be rewritten safely
    #[error("malformed remote entry {uid}: {reason}")]
    MalformedEntry { uid: String, reason: String },

    /// A mapped task has no counterpart on the server anymore
    #[error("remote entry {uid} for task {task_id} has vanished from the server")]
    MissingRemoteEntry { task_id: String, uid: String },

    /// The note store refused to read or rewrite a task
    #[error("note store error: {0}")]
    NoteStore(String),

    /// The mapping store could not be written
    #[error("unable to persist the sync state: {0}")]
    Persistence(String),

    /// A cycle is already running
    #[error("a sync is already in progress")]
    AlreadyRunning,
}

impl SyncError {
    /// Whether this error must abort the whole cycle (after a best-effort flush)
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }

    /// Tell whether a boxed collaborator error is fatal to a cycle
    pub fn is_fatal_boxed(err: &BoxError) -> bool {
        err.downcast_ref::<SyncError>()
            .map(|e| e.is_fatal())
            .unwrap_or(false)
    }
}
