//! To-do tasks, as read from the note store

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::TaskId;

/// A task can be uncompleted, or completed at a given date (which may be unknown).
///
/// Having a completion date on an uncompleted task makes no sense, this enum forbids it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Completed(Option<NaiveDate>),
    Uncompleted,
}
impl CompletionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, CompletionStatus::Completed(_))
    }

    pub fn completion_date(&self) -> Option<NaiveDate> {
        match self {
            CompletionStatus::Completed(date) => *date,
            CompletionStatus::Uncompleted => None,
        }
    }
}

/// A task, as stored in a note.
///
/// This is owned by the note store: the sync engine only reads it, and asks the note store to rewrite it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// The stable identifier embedded in the text of the task, if this task has ever been synced
    identifier: Option<TaskId>,
    /// The text of the task, without its markers
    description: String,
    due_date: Option<NaiveDate>,
    completion_status: CompletionStatus,
    tags: BTreeSet<String>,

    /// Path of the note that contains this task, relative to the root of the note store
    file_path: String,
    /// The verbatim source line
    raw_text: String,
    /// The last time the task (or the note that contains it) was modified
    last_modified: DateTime<Utc>,
}

impl Task {
    pub fn new(description: String, file_path: String, raw_text: String, last_modified: DateTime<Utc>) -> Self {
        Self {
            identifier: crate::identity::extract(&raw_text),
            description,
            due_date: None,
            completion_status: CompletionStatus::Uncompleted,
            tags: BTreeSet::new(),
            file_path,
            raw_text,
            last_modified,
        }
    }

    pub fn with_due_date(mut self, due_date: Option<NaiveDate>) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn with_completion_status(mut self, completion_status: CompletionStatus) -> Self {
        self.completion_status = completion_status;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn identifier(&self) -> Option<&TaskId>   { self.identifier.as_ref() }
    pub fn description(&self) -> &str             { &self.description }
    pub fn due_date(&self) -> Option<NaiveDate>   { self.due_date }
    pub fn completed(&self) -> bool               { self.completion_status.is_completed() }
    pub fn completion_status(&self) -> &CompletionStatus { &self.completion_status }
    pub fn tags(&self) -> &BTreeSet<String>       { &self.tags }
    pub fn file_path(&self) -> &str               { &self.file_path }
    pub fn raw_text(&self) -> &str                { &self.raw_text }
    pub fn last_modified(&self) -> &DateTime<Utc> { &self.last_modified }

    /// The values of the fields that are synced with the server
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            description: self.description.clone(),
            due_date: self.due_date,
            completed: self.completed(),
        }
    }

    /// Replace the source line (e.g. after an identifier has been embedded into it)
    pub fn set_raw_text(&mut self, raw_text: String) {
        self.identifier = crate::identity::extract(&raw_text);
        self.raw_text = raw_text;
    }

    /// Apply values coming from the server
    pub fn set_fields(&mut self, fields: &TaskFields, now: DateTime<Utc>) {
        self.description = fields.description.clone();
        self.due_date = fields.due_date;
        self.completion_status = match (fields.completed, &self.completion_status) {
            (false, _) => CompletionStatus::Uncompleted,
            (true, CompletionStatus::Completed(date)) => CompletionStatus::Completed(*date),
            (true, CompletionStatus::Uncompleted) => CompletionStatus::Completed(Some(now.date_naive())),
        };
        self.last_modified = now;
    }
}

/// The values this crate writes to (or reads from) a remote entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFields {
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
}

impl TaskFields {
    /// A stable fingerprint of these values, used to detect local changes between two syncs
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.description.as_bytes());
        hasher.update([0u8]);
        if let Some(due) = self.due_date {
            hasher.update(due.format("%Y-%m-%d").to_string().as_bytes());
        }
        hasher.update([0u8]);
        hasher.update([self.completed as u8]);
        hex::encode(hasher.finalize())
    }
}
