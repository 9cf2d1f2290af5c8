//! Support for sync configuration options
//!
//! Every field has a default, so that state files written by older versions can still be read.

use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// How many remote requests can be in flight at the same time, by default
pub const DEFAULT_CONCURRENCY: usize = 8;

/// How a task that has no mapping yet can be matched against an existing remote entry
/// (this happens after an interrupted cycle, or when two clients raced on a first sync)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentMatch {
    /// Always create a new remote entry
    Disabled,
    /// Match the task identifier against remote UIDs
    Uid,
    /// Match by UID, then by an identical summary and due date among unmapped remote entries
    UidThenSummary,
}

impl Default for ContentMatch {
    fn default() -> Self {
        ContentMatch::Uid
    }
}

/// Options that drive a reconciliation cycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tasks in files under these folders (path prefixes, relative to the note store root) are never synced
    pub excluded_folders: Vec<String>,
    /// Tasks carrying one of these tags are never synced. The leading `#` is optional.
    pub excluded_tags: Vec<String>,
    /// Completed tasks older than this are not synced anymore. `None` means "no limit"
    pub completed_task_age_days: Option<u32>,
    /// Only sync tasks that have a due date (or that have been synced already)
    pub due_date_only: bool,

    /// Verbosity of the sync log
    pub log_level: LevelFilter,
    /// Maximum number of concurrent requests to the server
    pub concurrency: usize,
    /// Strategy used to find remote entries for unmapped tasks
    pub content_match: ContentMatch,

    /// Part of the ProdID string that describes the organization (example of a ProdID string: `-//ABC Corporation//My Product//EN`).
    pub org_name: String,
    /// Part of the ProdID string that describes the product name
    pub product_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            excluded_folders: Vec::new(),
            excluded_tags: Vec::new(),
            completed_task_age_days: None,
            due_date_only: false,
            log_level: LevelFilter::Info,
            concurrency: DEFAULT_CONCURRENCY,
            content_match: ContentMatch::default(),
            org_name: "vtodo-sync".to_string(),
            product_name: "VTODO Sync".to_string(),
        }
    }
}

impl SyncConfig {
    /// The PRODID of entries created by this crate
    pub fn prod_id(&self) -> String {
        format!("-//{}//{}//EN", self.org_name, self.product_name)
    }

    /// The concurrency limit, never lower than 1
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Credentials and location of the remote calendar.
///
/// This is never persisted along with the sync state.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// URL of the calendar collection that holds the VTODOs
    pub calendar_url: url::Url,
    pub username: String,
    pub password: String,
}
