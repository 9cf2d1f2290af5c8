//! This crate keeps to-do items written in notes in sync with VTODO entries of a CalDAV calendar.
//!
//! Local tasks come from a [`NoteStore`](traits::NoteStore), e.g. a [`MarkdownVault`](vault::MarkdownVault). \
//! Remote entries are reached through a [`CalDavTransport`](traits::CalDavTransport), e.g. the HTTP [`Client`](client::Client).
//!
//! A [`Reconciler`](engine::Reconciler) runs sync cycles between these two sources. It remembers which task is
//! linked to which remote entry in a [`MappingStore`](mapping::MappingStore), that is persisted once per cycle
//! (see [`StateFile`](state::StateFile)). \
//! Remote entries are rewritten in place: properties this crate does not manage (alarms, categories,
//! custom properties from other clients...) are kept as they are.

pub mod traits;

pub mod config;
pub use config::{ServerConfig, SyncConfig};
pub mod error;
pub use error::SyncError;
pub mod identity;
pub use identity::TaskId;
pub mod task;
pub use task::Task;
pub mod filter;
pub mod ical;
pub mod remote;
pub mod mapping;
pub use mapping::MappingStore;
pub mod state;

pub mod engine;
pub use engine::Reconciler;
pub mod trigger;
pub use trigger::SyncTrigger;

pub mod client;
mod resource;
pub mod vault;

#[cfg(any(test, feature = "mock_sources"))]
pub mod mock;
#[cfg(any(test, feature = "mock_sources"))]
pub mod mock_behaviour;
pub mod utils;
