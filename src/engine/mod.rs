//! The reconciliation engine, that syncs local tasks with remote VTODOs
//!
//! A cycle goes through these steps:
//! 1. indexing: every remote entry is fetched once, and indexed by UID
//! 2. planning: local tasks that pass the [filter](crate::filter) are compared to their remote counterpart,
//!    and turned into actions (create, update, pull from the server, or nothing)
//! 3. committing: remote writes are sent in bounded batches, and the mapping store is updated in task order
//! 4. persisting: the mapping store is flushed once, even if the cycle failed halfway

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::config::SyncConfig;
use crate::error::{BoxError, SyncError};
use crate::filter::should_sync;
use crate::identity::TaskId;
use crate::ical::{self, CodecError};
use crate::mapping::{MappingEntry, MappingStore};
use crate::remote::{CreatedEntry, RemoteEntry, VersionTag};
use crate::task::{Task, TaskFields};
use crate::traits::{CalDavTransport, NoteStore};

pub mod conflict;
use conflict::Resolution;
mod lookup;
use lookup::SecondaryLookup;
pub mod sync_progress;
use sync_progress::{FeedbackSender, SyncEvent, SyncProgress, SyncReport, Verbosity};


/// A remote write, decided during the planning step
struct PlannedWrite {
    id: TaskId,
    description: String,
    content_hash: String,
    local_modified: DateTime<Utc>,
    kind: WriteKind,
}

enum WriteKind {
    Create { text: String },
    Update {
        uid: String,
        href: String,
        version_tag: VersionTag,
        /// The text the update is based on. `None` if it must be fetched first
        base_text: Option<String>,
        fields: TaskFields,
    },
}

/// What a remote write resulted in
enum Written {
    Created(CreatedEntry),
    Updated {
        uid: String,
        href: String,
        version_tag: VersionTag,
        /// Set when the entry could not be rewritten in place, and has been rebuilt from scratch
        degraded: Option<CodecError>,
    },
}


/// Syncs the tasks of a [`NoteStore`] with the VTODOs of a [`CalDavTransport`].
///
/// Local tasks drive a cycle: the server is never asked to delete anything, and remote entries that
/// are not linked to a local task are left alone.
pub struct Reconciler<N, T>
where
    N: NoteStore + Send,
    T: CalDavTransport + Send,
{
    note_store: N,
    transport: T,
    mappings: MappingStore,
    config: SyncConfig,
    verbosity: Verbosity,
}

impl<N, T> Reconciler<N, T>
where
    N: NoteStore + Send,
    T: CalDavTransport + Send,
{
    pub fn new(note_store: N, transport: T, config: SyncConfig, mappings: MappingStore) -> Self {
        let verbosity = Verbosity::new(config.log_level);
        Self { note_store, transport, mappings, config, verbosity }
    }

    pub fn note_store(&self) -> &N { &self.note_store }
    pub fn note_store_mut(&mut self) -> &mut N { &mut self.note_store }
    pub fn transport(&self) -> &T { &self.transport }
    pub fn mappings(&self) -> &MappingStore { &self.mappings }
    pub fn config(&self) -> &SyncConfig { &self.config }

    /// Change the configuration. The log level applies right away, the rest is used from the next cycle on
    pub fn set_config(&mut self, config: SyncConfig) {
        self.verbosity.set(config.log_level);
        if config != self.config {
            self.mappings.mark_dirty();
        }
        self.config = config;
    }

    /// A handle to change the log level, even while a cycle is running
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity.clone()
    }

    /// Run a sync cycle, and provide feedback about its progress.
    ///
    /// Errors are logged (see [`SyncConfig::log_level`]) and counted in the returned report.
    /// Whatever happens, the mapping store is flushed once at the end of the cycle, so that a failed
    /// cycle can simply be run again: it will pick up where it failed.
    pub async fn sync_with_feedback(&mut self, feedback_sender: FeedbackSender) -> SyncReport {
        let mut progress = SyncProgress::new_with_feedback_channel(self.verbosity.clone(), feedback_sender);
        self.run_sync(&mut progress).await;
        progress.into_report()
    }

    /// Run a sync cycle, without giving any feedback.
    ///
    /// See [`Self::sync_with_feedback`]
    pub async fn sync(&mut self) -> SyncReport {
        let mut progress = SyncProgress::new(self.verbosity.clone());
        self.run_sync(&mut progress).await;
        progress.into_report()
    }

    async fn run_sync(&mut self, progress: &mut SyncProgress) {
        progress.info("Starting a sync.");
        progress.feedback(SyncEvent::Started);

        if let Err(err) = self.run_sync_inner(progress).await {
            progress.fatal(&format!("Sync terminated because of an error: {}", err));
        }

        progress.feedback(SyncEvent::Persisting);
        let log_level = self.verbosity.get();
        if log_level != self.config.log_level {
            self.config.log_level = log_level;
            self.mappings.mark_dirty();
        }
        if let Err(err) = self.mappings.flush(&self.config) {
            progress.fatal(&format!("Unable to save the sync state: {}", err));
        }

        progress.info(&format!("Sync ended: {}", progress.report()));
        progress.feedback(SyncEvent::Finished{ success: progress.is_success() });
    }

    async fn run_sync_inner(&mut self, progress: &mut SyncProgress) -> Result<(), BoxError> {
        let now = Utc::now();

        // Step 1 - index the remote entries
        progress.feedback(SyncEvent::Indexing);
        let index = self.transport.fetch_all_entries().await?;
        progress.debug(&format!("{} remote entries", index.len()));

        let tasks = self.note_store.list_tasks().await
            .map_err(|err| SyncError::NoteStore(err.to_string()))?;
        let eligible: Vec<&Task> = tasks.iter()
            .filter(|task| should_sync(task, &self.config, &self.mappings, now))
            .collect();
        progress.debug(&format!("{} tasks out of {} are eligible for sync", eligible.len(), tasks.len()));

        // Step 2 - decide what to do with every task
        let mut lookup = SecondaryLookup::new(self.config.content_match, &index, self.mappings.remote_uids());
        let mut seen_ids = HashSet::new();
        let mut writes = Vec::new();
        for task in &eligible {
            progress.trace(&format!("***** Considering task {:?} in {}...", task.description(), task.file_path()));
            if let Some(id) = task.identifier() {
                if seen_ids.insert(id.clone()) == false {
                    progress.task_failed(&format!("Task {:?} in {} reuses identifier {}. Ignoring it in the sync", task.description(), task.file_path(), id));
                    continue;
                }
            }

            if let Some(write) = self.plan_task(task, &index, &mut lookup, progress, &now).await? {
                writes.push(write);
            }
        }

        // Step 3 - send the remote writes
        let total = writes.len();
        progress.reset_counter();
        let prod_id = self.config.prod_id();
        for batch in writes.chunks(self.config.effective_concurrency()) {
            let transport = &self.transport;
            let results = join_all(
                batch.iter().map(|write| execute(transport, write, &prod_id, &now))
            ).await;

            let mut fatal = None;
            for (write, result) in batch.iter().zip(results) {
                progress.increment_counter(1);
                progress.feedback(SyncEvent::InProgress{
                    items_done_already: progress.counter(),
                    items_total: total,
                    details: write.description.clone(),
                });

                match result {
                    Ok(written) => self.record(write, written, progress, &now),
                    Err(err) => {
                        progress.task_failed(&format!("Unable to sync task {:?}: {}", write.description, err));
                        if SyncError::is_fatal_boxed(&err) && fatal.is_none() {
                            fatal = Some(err);
                        }
                    },
                }
            }

            if let Some(err) = fatal {
                return Err(err);
            }
        }

        Ok(())
    }

    /// Decide what to do with a task. Returns the remote write it needs, if any.
    ///
    /// Tasks that only need local changes (or no change at all) are handled right away.
    /// Per-task failures are reported to `progress`, errors are returned only when the cycle must stop.
    async fn plan_task(
        &mut self,
        task: &Task,
        index: &HashMap<String, RemoteEntry>,
        lookup: &mut SecondaryLookup,
        progress: &mut SyncProgress,
        now: &DateTime<Utc>,
    ) -> Result<Option<PlannedWrite>, BoxError> {
        let mapping = task.identifier()
            .and_then(|id| self.mappings.get(id).map(|m| (id.clone(), m.clone())));

        match mapping {
            Some((id, mapping)) => {
                match index.get(&mapping.remote_uid) {
                    None => {
                        let err = SyncError::MissingRemoteEntry { task_id: id.to_string(), uid: mapping.remote_uid.clone() };
                        progress.task_failed(&format!("{}. It will not be re-created, restore it on the server or remove its identifier from {}", err, task.file_path()));
                        Ok(None)
                    },
                    Some(remote) => self.plan_mapped(task, id, &mapping, remote, progress, now).await,
                }
            },
            None => {
                match lookup.find(task, index) {
                    Some(remote) => self.plan_adoption(task, remote, progress, now).await,
                    None => Ok(self.plan_creation(task, lookup, progress, now).await),
                }
            },
        }
    }

    /// A task that was synced before
    async fn plan_mapped(
        &mut self,
        task: &Task,
        id: TaskId,
        mapping: &MappingEntry,
        remote: &RemoteEntry,
        progress: &mut SyncProgress,
        now: &DateTime<Utc>,
    ) -> Result<Option<PlannedWrite>, BoxError> {
        let fields = task.fields();
        let content_hash = fields.content_hash();
        let local_changed = content_hash != mapping.content_hash;
        let remote_changed = remote.version_tag != mapping.revision_tag;

        if local_changed == false && remote_changed == false {
            progress.trace(&format!("*   {} is unchanged", id));
            progress.skipped();
            return Ok(None);
        }

        let remote_text = if remote_changed {
            match self.remote_text(task, &id, remote, progress).await? {
                Some(text) => Some(text),
                None => return Ok(None),
            }
        } else {
            None
        };
        let remote_todo = match remote_text.as_deref().map(ical::read_remote) {
            None => None,
            Some(Ok(todo)) => Some(todo),
            Some(Err(err)) => {
                progress.warn(&format!("Unable to read remote entry {}: {}", remote.uid, err));
                None
            },
        };
        let remote_modified = remote_todo.as_ref()
            .and_then(|todo| todo.last_modified)
            .or(mapping.remote_modified);

        if let Some(todo) = &remote_todo {
            if todo.fields == fields {
                progress.debug(&format!("*   {} has been changed on the server, but its synced values are the same", id));
                self.mappings.put(id, MappingEntry {
                    revision_tag: remote.version_tag.clone(),
                    last_synced_at: *now,
                    content_hash,
                    local_modified: *task.last_modified(),
                    remote_modified,
                    ..mapping.clone()
                });
                progress.skipped();
                return Ok(None);
            }
        }

        let write = match conflict::resolve(local_changed, remote_changed, task.last_modified(), remote_modified.as_ref()) {
            Resolution::Unchanged => {
                progress.skipped();
                None
            },
            Resolution::RemoteWins => {
                let todo = match remote_todo {
                    Some(todo) => todo,
                    None => {
                        progress.task_failed(&format!("Task {:?} has been changed on the server, but the remote entry is unreadable", task.description()));
                        return Ok(None);
                    },
                };
                if local_changed {
                    progress.info(&format!("Conflict: task {:?} has been modified in both sources. Using the remote version, which is more recent.", task.description()));
                }
                progress.debug(&format!("*   {} is a remote change", id));
                match self.note_store.apply_remote_fields(task, &todo.fields).await {
                    Err(err) => progress.task_failed(&format!("Unable to apply remote changes to task {:?}: {}", task.description(), err)),
                    Ok(()) => {
                        self.mappings.put(id, MappingEntry {
                            revision_tag: remote.version_tag.clone(),
                            last_synced_at: *now,
                            content_hash: todo.fields.content_hash(),
                            local_modified: *now,
                            remote_modified,
                            ..mapping.clone()
                        });
                        progress.pulled();
                    },
                }
                None
            },
            Resolution::LocalWins => {
                if remote_changed {
                    progress.info(&format!("Conflict: task {:?} has been modified in both sources. Using the local version, which is more recent.", task.description()));
                }
                progress.debug(&format!("*   {} is a local change", id));
                Some(PlannedWrite {
                    id,
                    description: task.description().to_string(),
                    content_hash,
                    local_modified: *task.last_modified(),
                    kind: WriteKind::Update {
                        uid: remote.uid.clone(),
                        href: remote.href.clone(),
                        version_tag: remote.version_tag.clone(),
                        base_text: remote_text.or_else(|| base_text(remote)),
                        fields,
                    },
                })
            },
        };
        Ok(write)
    }

    /// A task with no mapping, but whose remote counterpart already exists (e.g. after an interrupted cycle)
    async fn plan_adoption(
        &mut self,
        task: &Task,
        remote: &RemoteEntry,
        progress: &mut SyncProgress,
        now: &DateTime<Utc>,
    ) -> Result<Option<PlannedWrite>, BoxError> {
        let id = match self.ensure_identifier(task, progress).await {
            Some(id) => id,
            None => return Ok(None),
        };
        let fields = task.fields();
        let content_hash = fields.content_hash();
        progress.info(&format!("Linking task {:?} to existing remote entry {}", task.description(), remote.uid));

        let remote_text = match self.remote_text(task, &id, remote, progress).await? {
            Some(text) => text,
            None => return Ok(None),
        };
        let remote_todo = ical::read_remote(&remote_text).ok();
        if let Some(todo) = &remote_todo {
            if todo.fields == fields {
                self.mappings.put(id, MappingEntry {
                    remote_uid: remote.uid.clone(),
                    remote_href: remote.href.clone(),
                    revision_tag: remote.version_tag.clone(),
                    last_synced_at: *now,
                    content_hash,
                    local_modified: *task.last_modified(),
                    remote_modified: todo.last_modified,
                });
                progress.skipped();
                return Ok(None);
            }
        }

        // There is no sync history to compare with: the local side drives this cycle
        Ok(Some(PlannedWrite {
            id,
            description: task.description().to_string(),
            content_hash,
            local_modified: *task.last_modified(),
            kind: WriteKind::Update {
                uid: remote.uid.clone(),
                href: remote.href.clone(),
                version_tag: remote.version_tag.clone(),
                base_text: Some(remote_text),
                fields,
            },
        }))
    }

    /// A task that has never been synced
    async fn plan_creation(
        &mut self,
        task: &Task,
        lookup: &mut SecondaryLookup,
        progress: &mut SyncProgress,
        now: &DateTime<Utc>,
    ) -> Option<PlannedWrite> {
        let id = self.ensure_identifier(task, progress).await?;
        lookup.claim(id.as_str());
        progress.debug(&format!("*   {} is a local addition", id));

        let fields = task.fields();
        let text = ical::build_new(id.as_str(), &fields, &self.config.prod_id(), now);
        Some(PlannedWrite {
            id,
            description: task.description().to_string(),
            content_hash: fields.content_hash(),
            local_modified: *task.last_modified(),
            kind: WriteKind::Create { text },
        })
    }

    /// Return the identifier of a task, embedding a new one into its text if needed
    async fn ensure_identifier(&mut self, task: &Task, progress: &mut SyncProgress) -> Option<TaskId> {
        if let Some(id) = task.identifier() {
            return Some(id.clone());
        }

        let id = TaskId::assign();
        let new_raw_text = crate::identity::embed(task.raw_text(), &id);
        match self.note_store.rewrite_task_line(task, &new_raw_text).await {
            Ok(()) => Some(id),
            Err(err) => {
                progress.task_failed(&format!("Unable to write an identifier into task {:?} in {}: {}", task.description(), task.file_path(), err));
                None
            },
        }
    }

    /// The text of a remote entry, fetched from the server when the index did not carry it.
    ///
    /// Returns `Ok(None)` when the task cannot be synced this cycle (this has been reported already).
    async fn remote_text(&self, task: &Task, id: &TaskId, remote: &RemoteEntry, progress: &mut SyncProgress) -> Result<Option<String>, BoxError> {
        if let Some(text) = base_text(remote) {
            return Ok(Some(text));
        }

        progress.trace(&format!("*   fetching remote entry {}", remote.uid));
        match self.transport.fetch_entry_raw_text(&remote.uid).await {
            Ok(Some(text)) => Ok(Some(text)),
            Ok(None) => {
                let err = SyncError::MissingRemoteEntry { task_id: id.to_string(), uid: remote.uid.clone() };
                progress.task_failed(&format!("{}. It has been removed from the server during the sync", err));
                Ok(None)
            },
            Err(err) if SyncError::is_fatal_boxed(&err) => Err(err),
            Err(err) => {
                progress.task_failed(&format!("Unable to fetch the remote entry of task {:?}: {}", task.description(), err));
                Ok(None)
            },
        }
    }

    /// Update the mapping store after a successful remote write
    fn record(&mut self, write: &PlannedWrite, written: Written, progress: &mut SyncProgress, now: &DateTime<Utc>) {
        let (uid, href, version_tag) = match written {
            Written::Created(created) => {
                progress.created();
                (created.uid, created.href, created.version_tag)
            },
            Written::Updated{ uid, href, version_tag, degraded } => {
                if let Some(reason) = degraded {
                    progress.warn(&format!("Remote entry {} could not be updated in place ({}). It has been rebuilt from scratch, and the properties this tool does not manage have been lost", uid, reason));
                }
                progress.updated();
                (uid, href, version_tag)
            },
        };

        self.mappings.put(write.id.clone(), MappingEntry {
            remote_uid: uid,
            remote_href: href,
            revision_tag: version_tag,
            last_synced_at: *now,
            content_hash: write.content_hash.clone(),
            local_modified: write.local_modified,
            remote_modified: Some(*now),
        });
    }
}

/// The text an update can be based on, if the index provided one
fn base_text(remote: &RemoteEntry) -> Option<String> {
    if remote.raw_text.trim().is_empty() {
        None
    } else {
        Some(remote.raw_text.clone())
    }
}

/// Send a planned write to the server
async fn execute<T: CalDavTransport>(transport: &T, write: &PlannedWrite, prod_id: &str, now: &DateTime<Utc>) -> Result<Written, BoxError> {
    match &write.kind {
        WriteKind::Create { text } => {
            let created = transport.create_entry(write.id.as_str(), text).await?;
            Ok(Written::Created(created))
        },
        WriteKind::Update { uid, href, version_tag, base_text, fields } => {
            let base_text = match base_text {
                Some(text) => text.clone(),
                None => transport.fetch_entry_raw_text(uid).await?
                    .ok_or_else(|| SyncError::MissingRemoteEntry { task_id: write.id.to_string(), uid: uid.clone() })?,
            };

            let (text, degraded) = match ical::apply_update(&base_text, fields, now) {
                Ok(text) => (text, None),
                Err(err) => (ical::build_new(uid, fields, prod_id, now), Some(err)),
            };

            let new_tag = transport.update_entry(href, version_tag, &text).await?;
            Ok(Written::Updated { uid: uid.clone(), href: href.clone(), version_tag: new_tag, degraded })
        },
    }
}
