//! Utilities to track the progression of a sync

use std::fmt::{Display, Error, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{Level, LevelFilter};

/// An event that happens during a sync
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// Sync has not started
    NotStarted,
    /// Sync has just started
    Started,
    /// Remote entries are being fetched and indexed
    Indexing,
    /// Tasks are being reconciled
    InProgress{ items_done_already: usize, items_total: usize, details: String },
    /// The mapping store is being written
    Persisting,
    /// Sync is finished
    Finished{ success: bool },
}

impl Display for SyncEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            SyncEvent::NotStarted => write!(f, "Not started"),
            SyncEvent::Started => write!(f, "Sync has started..."),
            SyncEvent::Indexing => write!(f, "Fetching remote entries..."),
            SyncEvent::InProgress{items_done_already, items_total, details} => write!(f, "[{}/{}] {}...", items_done_already, items_total, details),
            SyncEvent::Persisting => write!(f, "Saving the sync state..."),
            SyncEvent::Finished{success} => match success {
                true => write!(f, "Sync successfully finished"),
                false => write!(f, "Sync finished with errors"),
            }
        }
    }
}

impl Default for SyncEvent {
    fn default() -> Self {
        Self::NotStarted
    }
}



/// See [`feedback_channel`]
pub type FeedbackSender = tokio::sync::watch::Sender<SyncEvent>;
/// See [`feedback_channel`]
pub type FeedbackReceiver = tokio::sync::watch::Receiver<SyncEvent>;

/// Create a feeback channel, that can be used to retrieve the current progress of a sync operation
pub fn feedback_channel() -> (FeedbackSender, FeedbackReceiver) {
    tokio::sync::watch::channel(SyncEvent::default())
}


/// The outcome of a sync cycle
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncReport {
    /// Tasks that have been created on the server
    pub created: usize,
    /// Tasks whose remote entry has been rewritten
    pub updated: usize,
    /// Tasks that have been updated from the server
    pub pulled: usize,
    /// Tasks that needed no change
    pub skipped: usize,
    /// Tasks that could not be synced this time
    pub failed: usize,
    /// The error that aborted the cycle, if any
    pub fatal_error: Option<String>,
}

impl SyncReport {
    pub fn success_count(&self) -> usize {
        self.created + self.updated + self.pulled + self.skipped
    }

    pub fn failure_count(&self) -> usize {
        self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.fatal_error.is_none()
    }
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{} created, {} updated, {} pulled, {} unchanged, {} failed",
            self.created, self.updated, self.pulled, self.skipped, self.failed)?;
        if let Some(err) = &self.fatal_error {
            write!(f, " (aborted: {})", err)?;
        }
        Ok(())
    }
}


/// A log level that can be changed while a sync is running.
///
/// Clones share the same value.
#[derive(Clone, Debug)]
pub struct Verbosity(Arc<AtomicUsize>);

impl Verbosity {
    pub fn new(level: LevelFilter) -> Self {
        Self(Arc::new(AtomicUsize::new(level as usize)))
    }

    pub fn get(&self) -> LevelFilter {
        match self.0.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn set(&self, level: LevelFilter) {
        self.0.store(level as usize, Ordering::Relaxed);
    }
}

impl From<LevelFilter> for Verbosity {
    fn from(level: LevelFilter) -> Self {
        Self::new(level)
    }
}


/// A structure that tracks the progression and the errors that happen during a sync.
///
/// It also acts as the logging context of a cycle: messages less severe than its verbosity are dropped.
pub struct SyncProgress {
    verbosity: Verbosity,
    report: SyncReport,
    counter: usize,
    feedback_channel: Option<FeedbackSender>
}
impl SyncProgress {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity, report: SyncReport::default(), counter: 0, feedback_channel: None }
    }
    pub fn new_with_feedback_channel(verbosity: Verbosity, channel: FeedbackSender) -> Self {
        Self { verbosity, report: SyncReport::default(), counter: 0, feedback_channel: Some(channel) }
    }

    /// Change the verbosity. This takes effect on the next message
    pub fn set_verbosity(&mut self, verbosity: LevelFilter) {
        self.verbosity.set(verbosity);
    }

    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }

    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    pub fn into_report(self) -> SyncReport {
        self.report
    }

    pub fn created(&mut self) { self.report.created += 1; }
    pub fn updated(&mut self) { self.report.updated += 1; }
    pub fn pulled(&mut self)  { self.report.pulled += 1; }
    pub fn skipped(&mut self) { self.report.skipped += 1; }

    /// Log an error that prevented a task from being synced
    pub fn task_failed(&mut self, text: &str) {
        self.log(Level::Error, text);
        self.report.failed += 1;
    }

    /// Record the error that aborted the cycle
    pub fn fatal(&mut self, text: &str) {
        self.log(Level::Error, text);
        if self.report.fatal_error.is_none() {
            self.report.fatal_error = Some(text.to_string());
        }
    }

    /// Log an error
    pub fn error(&mut self, text: &str) {
        self.log(Level::Error, text);
    }
    /// Log a warning
    pub fn warn(&mut self, text: &str) {
        self.log(Level::Warn, text);
    }
    /// Log an info
    pub fn info(&mut self, text: &str) {
        self.log(Level::Info, text);
    }
    /// Log a debug message
    pub fn debug(&mut self, text: &str) {
        self.log(Level::Debug, text);
    }
    /// Log a trace message
    pub fn trace(&mut self, text: &str) {
        self.log(Level::Trace, text);
    }

    fn log(&self, level: Level, text: &str) {
        if level <= self.verbosity.get() {
            log::log!(level, "{}", text);
        }
    }

    pub fn counter(&self) -> usize {
        self.counter
    }
    pub fn increment_counter(&mut self, amount: usize) {
        self.counter += amount;
    }
    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }

    /// Send an event as a feedback to the listener (if any).
    pub fn feedback(&mut self, event: SyncEvent) {
        if let Some(sender) = self.feedback_channel.as_ref() {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts() {
        let mut progress = SyncProgress::new(LevelFilter::Off.into());
        progress.created();
        progress.updated();
        progress.skipped();
        assert!(progress.is_success());

        progress.task_failed("could not reach the server");
        assert_eq!(progress.report().success_count(), 3);
        assert_eq!(progress.report().failure_count(), 1);
        assert!(progress.is_success() == false);

        progress.fatal("first");
        progress.fatal("second");
        assert_eq!(progress.into_report().fatal_error.as_deref(), Some("first"));
    }

    #[test]
    fn feedback_is_forwarded() {
        let (sender, receiver) = feedback_channel();
        let mut progress = SyncProgress::new_with_feedback_channel(LevelFilter::Info.into(), sender);
        progress.feedback(SyncEvent::Indexing);
        assert_eq!(*receiver.borrow(), SyncEvent::Indexing);
    }

    #[test]
    fn verbosity_is_shared() {
        let verbosity = Verbosity::new(LevelFilter::Info);
        let mut progress = SyncProgress::new(verbosity.clone());
        verbosity.set(LevelFilter::Trace);
        assert_eq!(progress.verbosity.get(), LevelFilter::Trace);

        progress.set_verbosity(LevelFilter::Off);
        assert_eq!(verbosity.get(), LevelFilter::Off);
        for level in &[LevelFilter::Off, LevelFilter::Error, LevelFilter::Warn, LevelFilter::Info, LevelFilter::Debug, LevelFilter::Trace] {
            verbosity.set(*level);
            assert_eq!(verbosity.get(), *level);
        }
    }
}
