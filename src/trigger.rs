//! Serializes sync cycles

use log::LevelFilter;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::SyncConfig;
use crate::engine::sync_progress::{FeedbackSender, SyncReport, Verbosity};
use crate::engine::Reconciler;
use crate::error::SyncError;
use crate::traits::{CalDavTransport, NoteStore};

/// The entry point for callers that may ask for a sync at any time (a timer, a button...).
///
/// At most one cycle runs at once: a request that comes while a cycle is running is rejected
/// rather than queued.
pub struct SyncTrigger<N, T>
where
    N: NoteStore + Send,
    T: CalDavTransport + Send,
{
    engine: Mutex<Reconciler<N, T>>,
    verbosity: Verbosity,
}

impl<N, T> SyncTrigger<N, T>
where
    N: NoteStore + Send,
    T: CalDavTransport + Send,
{
    pub fn new(engine: Reconciler<N, T>) -> Self {
        let verbosity = engine.verbosity();
        Self { engine: Mutex::new(engine), verbosity }
    }

    /// Change the log level. Unlike [`Self::set_config`], this does not wait for the running cycle
    pub fn set_log_level(&self, level: LevelFilter) {
        self.verbosity.set(level);
    }

    /// Run a cycle, unless one is already running
    pub async fn trigger(&self) -> Result<SyncReport, SyncError> {
        let mut engine = self.engine.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        Ok(engine.sync().await)
    }

    /// Same as [`Self::trigger`], with progress feedback
    pub async fn trigger_with_feedback(&self, feedback_sender: FeedbackSender) -> Result<SyncReport, SyncError> {
        let mut engine = self.engine.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        Ok(engine.sync_with_feedback(feedback_sender).await)
    }

    /// Change the configuration. This waits for the running cycle (if any) to end, and applies to the next one
    pub async fn set_config(&self, config: SyncConfig) {
        self.engine.lock().await.set_config(config);
    }

    /// Access the engine, waiting for the running cycle (if any) to end
    pub async fn engine(&self) -> MutexGuard<'_, Reconciler<N, T>> {
        self.engine.lock().await
    }

    pub fn into_inner(self) -> Reconciler<N, T> {
        self.engine.into_inner()
    }
}
