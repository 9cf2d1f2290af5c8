//! This module persists the sync state (configuration and mapping store) in a local JSON file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::{BoxError, SyncError};
use crate::identity::TaskId;
use crate::mapping::{MappingBackend, MappingEntry, MappingStore};

/// Version of the layout of the state file
pub const STATE_VERSION: u32 = 1;

/// The persisted record, as read from the file.
/// Keys are kept as raw strings here, so that a single malformed key does not make the whole file unreadable
#[derive(Default, Debug, Deserialize)]
#[serde(default)]
struct StoredState {
    version: u32,
    config: SyncConfig,
    mappings: HashMap<String, MappingEntry>,
}

#[derive(Serialize)]
struct StoredStateRef<'a> {
    version: u32,
    config: &'a SyncConfig,
    mappings: &'a HashMap<TaskId, MappingEntry>,
}

/// A sync state that lives in a local file
#[derive(Debug, Clone, PartialEq)]
pub struct StateFile {
    backing_file: PathBuf,
}

impl StateFile {
    pub fn new(path: &Path) -> Self {
        Self { backing_file: PathBuf::from(path) }
    }

    pub fn path(&self) -> &Path {
        &self.backing_file
    }

    /// Read the configuration and the mapping store from the backing file.
    ///
    /// A missing file is not an error: defaults are used instead.
    pub fn load(self) -> Result<(SyncConfig, MappingStore), BoxError> {
        let stored: StoredState = match std::fs::File::open(&self.backing_file) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No state file at {:?}, starting from scratch", self.backing_file);
                StoredState::default()
            },
            Err(err) => {
                return Err(format!("Unable to open file {:?}: {}", self.backing_file, err).into());
            },
            Ok(file) => serde_json::from_reader(std::io::BufReader::new(file))?,
        };

        if stored.version > STATE_VERSION {
            return Err(format!("State file {:?} has version {}, which is newer than the supported version {}",
                self.backing_file, stored.version, STATE_VERSION).into());
        }

        let mut entries = HashMap::with_capacity(stored.mappings.len());
        for (key, entry) in stored.mappings {
            match key.parse::<TaskId>() {
                Ok(id) => { entries.insert(id, entry); },
                Err(err) => log::warn!("Ignoring a mapping entry: {}", err),
            }
        }

        let config = stored.config;
        Ok((config, MappingStore::with_entries(entries, Box::new(self))))
    }
}

impl MappingBackend for StateFile {
    /// Write to a sibling temporary file, then atomically rename it over the backing file
    fn write(&mut self, config: &SyncConfig, mappings: &HashMap<TaskId, MappingEntry>) -> Result<(), BoxError> {
        let state = StoredStateRef { version: STATE_VERSION, config, mappings };

        let mut tmp_name = self.backing_file.file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.backing_file.with_file_name(tmp_name);

        let persist = || -> Result<(), BoxError> {
            if let Some(parent) = self.backing_file.parent() {
                if parent.as_os_str().is_empty() == false {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = std::fs::File::create(&tmp_path)?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer(&mut writer, &state)?;
            let file = writer.into_inner().map_err(|err| err.into_error())?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.backing_file)?;
            Ok(())
        };

        persist().map_err(|err| {
            let _ = std::fs::remove_file(&tmp_path);
            Box::new(SyncError::Persistence(format!("{:?}: {}", self.backing_file, err))) as BoxError
        })
    }
}
