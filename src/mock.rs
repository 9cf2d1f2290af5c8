//! In-memory collaborators, to run the sync engine without a server nor a note folder.
//!
//! These are mostly useful for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::config::SyncConfig;
use crate::error::{BoxError, SyncError};
use crate::identity::TaskId;
use crate::mapping::{MappingBackend, MappingEntry};
use crate::mock_behaviour::MockBehaviour;
use crate::remote::{CreatedEntry, RemoteEntry, VersionTag};
use crate::task::{Task, TaskFields};
use crate::traits::{CalDavTransport, NoteStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A fake CalDAV calendar, that lives in memory
#[derive(Default)]
pub struct MockTransport {
    entries: Mutex<HashMap<String, RemoteEntry>>,
    behaviour: Mutex<MockBehaviour>,
    /// When set, the index does not carry the text of entries (like servers that only list ETags)
    index_without_text: bool,
    creations: Mutex<u32>,
    updates: Mutex<u32>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self { behaviour: Mutex::new(behaviour), ..Self::default() }
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        *lock(&self.behaviour) = behaviour;
    }

    pub fn set_index_without_text(&mut self, value: bool) {
        self.index_without_text = value;
    }

    pub fn href_for(uid: &str) -> String {
        format!("/calendar/{}.ics", uid)
    }

    /// Add (or replace) an entry, as if another client had written it
    pub fn insert_entry(&self, uid: &str, raw_text: &str) -> RemoteEntry {
        let entry = RemoteEntry {
            uid: uid.to_string(),
            href: Self::href_for(uid),
            version_tag: VersionTag::random(),
            raw_text: raw_text.to_string(),
        };
        lock(&self.entries).insert(uid.to_string(), entry.clone());
        entry
    }

    pub fn remove_entry(&self, uid: &str) -> Option<RemoteEntry> {
        lock(&self.entries).remove(uid)
    }

    pub fn entry(&self, uid: &str) -> Option<RemoteEntry> {
        lock(&self.entries).get(uid).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many entries have been created through [`CalDavTransport::create_entry`]
    pub fn creation_count(&self) -> u32 {
        *lock(&self.creations)
    }

    /// How many entries have been replaced through [`CalDavTransport::update_entry`]
    pub fn update_count(&self) -> u32 {
        *lock(&self.updates)
    }
}

#[async_trait]
impl CalDavTransport for MockTransport {
    async fn fetch_all_entries(&self) -> Result<HashMap<String, RemoteEntry>, BoxError> {
        lock(&self.behaviour).can_fetch_all_entries()?;
        let mut entries = lock(&self.entries).clone();
        if self.index_without_text {
            for entry in entries.values_mut() {
                entry.raw_text.clear();
            }
        }
        Ok(entries)
    }

    async fn create_entry(&self, uid: &str, raw_text: &str) -> Result<CreatedEntry, BoxError> {
        lock(&self.behaviour).can_create_entry()?;

        let mut entries = lock(&self.entries);
        if entries.contains_key(uid) {
            return Err(SyncError::Transport(format!("Entry {} already exists", uid)).into());
        }
        let entry = RemoteEntry {
            uid: uid.to_string(),
            href: Self::href_for(uid),
            version_tag: VersionTag::random(),
            raw_text: raw_text.to_string(),
        };
        let created = CreatedEntry { uid: entry.uid.clone(), href: entry.href.clone(), version_tag: entry.version_tag.clone() };
        entries.insert(uid.to_string(), entry);
        *lock(&self.creations) += 1;
        Ok(created)
    }

    async fn update_entry(&self, href: &str, version_tag: &VersionTag, raw_text: &str) -> Result<VersionTag, BoxError> {
        lock(&self.behaviour).can_update_entry()?;

        let mut entries = lock(&self.entries);
        let entry = entries.values_mut()
            .find(|entry| entry.href == href)
            .ok_or_else(|| SyncError::Transport(format!("Unexpected HTTP status code 404 for {}", href)))?;
        if &entry.version_tag != version_tag {
            return Err(SyncError::Transport(format!("Unexpected HTTP status code 412 for {}", href)).into());
        }
        entry.version_tag = VersionTag::random();
        entry.raw_text = raw_text.to_string();
        *lock(&self.updates) += 1;
        Ok(entry.version_tag.clone())
    }

    async fn fetch_entry_raw_text(&self, uid: &str) -> Result<Option<String>, BoxError> {
        lock(&self.behaviour).can_fetch_entry()?;
        Ok(lock(&self.entries).get(uid).map(|entry| entry.raw_text.clone()))
    }
}


/// A note store that keeps its tasks in memory
#[derive(Default, Debug)]
pub struct MemoryNoteStore {
    tasks: Vec<Task>,
    read_only: bool,
}

impl MemoryNoteStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks, read_only: false }
    }

    /// Make every rewrite fail
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn task_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.tasks.get_mut(index)
    }

    pub fn find_by_id(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.identifier() == Some(id))
    }

    fn position(&self, task: &Task) -> Result<usize, BoxError> {
        self.tasks.iter()
            .position(|candidate| candidate.file_path() == task.file_path() && candidate.raw_text() == task.raw_text())
            .ok_or_else(|| SyncError::NoteStore(format!("Task {:?} is not in {} anymore", task.description(), task.file_path())).into())
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, BoxError> {
        Ok(self.tasks.clone())
    }

    async fn rewrite_task_line(&mut self, task: &Task, new_raw_text: &str) -> Result<(), BoxError> {
        if self.read_only {
            return Err(SyncError::NoteStore("this store is read-only".to_string()).into());
        }
        let index = self.position(task)?;
        self.tasks[index].set_raw_text(new_raw_text.to_string());
        Ok(())
    }

    async fn apply_remote_fields(&mut self, task: &Task, fields: &TaskFields) -> Result<(), BoxError> {
        if self.read_only {
            return Err(SyncError::NoteStore("this store is read-only".to_string()).into());
        }
        let index = self.position(task)?;
        self.tasks[index].set_fields(fields, Utc::now());
        Ok(())
    }
}


/// A mapping backend that only counts how many times it has been written.
///
/// Clones share the same counters.
#[derive(Clone, Default, Debug)]
pub struct CountingBackend {
    writes: Arc<Mutex<Vec<usize>>>,
    failing: Arc<Mutex<bool>>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next writes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// How many times the mapping store has been flushed
    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// How many mappings the last flush contained
    pub fn last_written_len(&self) -> Option<usize> {
        lock(&self.writes).last().copied()
    }
}

impl MappingBackend for CountingBackend {
    fn write(&mut self, _config: &SyncConfig, mappings: &HashMap<TaskId, MappingEntry>) -> Result<(), BoxError> {
        if *lock(&self.failing) {
            return Err(SyncError::Persistence("mocked write failure".to_string()).into());
        }
        lock(&self.writes).push(mappings.len());
        Ok(())
    }
}
