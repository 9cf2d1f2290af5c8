//! The links between local tasks and remote entries

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::BoxError;
use crate::filter::MappedIds;
use crate::identity::TaskId;
use crate::remote::VersionTag;

/// What is known about the remote counterpart of a task, as of the last successful sync
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub remote_uid: String,
    pub remote_href: String,
    pub revision_tag: VersionTag,
    pub last_synced_at: DateTime<Utc>,
    /// Fingerprint of the synced values (see [`TaskFields::content_hash`](crate::task::TaskFields::content_hash))
    pub content_hash: String,
    pub local_modified: DateTime<Utc>,
    #[serde(default)]
    pub remote_modified: Option<DateTime<Utc>>,
}

/// Where a [`MappingStore`] is persisted
pub trait MappingBackend: Send {
    /// Durably write the whole state, in a single operation
    fn write(&mut self, config: &SyncConfig, mappings: &HashMap<TaskId, MappingEntry>) -> Result<(), BoxError>;
}

/// The in-memory map from task identifiers to their [`MappingEntry`].
///
/// `put` only marks the store as dirty. Nothing is written until [`MappingStore::flush`] is called,
/// so that a whole sync cycle costs a single write, whatever the number of tasks.
pub struct MappingStore {
    entries: HashMap<TaskId, MappingEntry>,
    dirty: bool,
    backend: Box<dyn MappingBackend>,
}

impl std::fmt::Debug for MappingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingStore")
            .field("entries", &self.entries.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl MappingStore {
    pub fn new(backend: Box<dyn MappingBackend>) -> Self {
        Self::with_entries(HashMap::new(), backend)
    }

    pub fn with_entries(entries: HashMap<TaskId, MappingEntry>, backend: Box<dyn MappingBackend>) -> Self {
        Self { entries, dirty: false, backend }
    }

    pub fn get(&self, id: &TaskId) -> Option<&MappingEntry> {
        self.entries.get(id)
    }

    pub fn put(&mut self, id: TaskId, entry: MappingEntry) {
        self.entries.insert(id, entry);
        self.dirty = true;
    }

    pub fn keys(&self) -> HashSet<TaskId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force the next flush to write, e.g. because the configuration saved along with the store has changed
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Iterate over the remote UIDs that are already linked to a task
    pub fn remote_uids(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.remote_uid.as_str())
    }

    /// Persist the whole store, if anything changed since the last flush
    pub fn flush(&mut self, config: &SyncConfig) -> Result<(), BoxError> {
        if self.dirty == false {
            log::debug!("Mapping store is unchanged, nothing to flush");
            return Ok(());
        }
        self.backend.write(config, &self.entries)?;
        self.dirty = false;
        log::debug!("Flushed {} mapping entries", self.entries.len());
        Ok(())
    }
}

impl MappedIds for MappingStore {
    fn is_mapped(&self, id: &TaskId) -> bool {
        self.entries.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Counting(Arc<Mutex<u32>>);
    impl MappingBackend for Counting {
        fn write(&mut self, _config: &SyncConfig, _mappings: &HashMap<TaskId, MappingEntry>) -> Result<(), BoxError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn entry(uid: &str) -> MappingEntry {
        MappingEntry {
            remote_uid: uid.to_string(),
            remote_href: format!("/cal/{}.ics", uid),
            revision_tag: VersionTag::from("tag"),
            last_synced_at: Utc::now(),
            content_hash: String::new(),
            local_modified: Utc::now(),
            remote_modified: None,
        }
    }

    #[test]
    fn puts_are_coalesced() {
        let writes = Arc::new(Mutex::new(0));
        let mut store = MappingStore::new(Box::new(Counting(writes.clone())));

        store.flush(&SyncConfig::default()).unwrap();
        assert_eq!(*writes.lock().unwrap(), 0);

        for i in 0..100 {
            let id = TaskId::assign();
            store.put(id.clone(), entry(&i.to_string()));
            assert!(store.is_mapped(&id));
        }
        assert!(store.is_dirty());
        store.flush(&SyncConfig::default()).unwrap();
        assert_eq!(*writes.lock().unwrap(), 1);
        assert!(store.is_dirty() == false);
        assert_eq!(store.keys().len(), 100);
    }
}
