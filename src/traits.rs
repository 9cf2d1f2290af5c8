//! The collaborators a sync engine relies on

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::remote::{CreatedEntry, RemoteEntry, VersionTag};
use crate::task::{Task, TaskFields};

/// A source of local tasks (e.g. a folder of Markdown notes)
#[async_trait]
pub trait NoteStore {
    /// Returns every task this store contains
    async fn list_tasks(&self) -> Result<Vec<Task>, BoxError>;

    /// Replace the source line of a task with `new_raw_text`.
    /// This is used to embed identifiers into tasks.
    async fn rewrite_task_line(&mut self, task: &Task, new_raw_text: &str) -> Result<(), BoxError>;

    /// Write values coming from the server into a task (when the server wins a conflict)
    async fn apply_remote_fields(&mut self, task: &Task, fields: &TaskFields) -> Result<(), BoxError>;
}

/// A remote calendar that contains VTODOs.
///
/// Errors should be [`SyncError`](crate::error::SyncError)s (boxed), so that the sync engine can tell whether they are fatal.
#[async_trait]
pub trait CalDavTransport: Sync {
    /// Returns every VTODO of the calendar, keyed by UID
    async fn fetch_all_entries(&self) -> Result<HashMap<String, RemoteEntry>, BoxError>;

    /// Create a new entry on the server
    async fn create_entry(&self, uid: &str, raw_text: &str) -> Result<CreatedEntry, BoxError>;

    /// Replace an entry, provided it has not changed on the server since `version_tag`.
    /// Returns the new version tag
    async fn update_entry(&self, href: &str, version_tag: &VersionTag, raw_text: &str) -> Result<VersionTag, BoxError>;

    /// Fetch the current text of a single entry. Returns `None` if it does not exist
    async fn fetch_entry_raw_text(&self, uid: &str) -> Result<Option<String>, BoxError>;
}
