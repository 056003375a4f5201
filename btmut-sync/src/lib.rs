//! # btmut-sync
//!
//! Mutable-publication synchronization for a local directory.
//!
//! [`Orchestrator`] decides, from the directory's pointer file and the key
//! vault, whether a call publishes for the first time, pushes an owned
//! publication, or pulls someone else's. It drives a [`TorrentEngine`] for
//! snapshots, resolution and publishing; [`LocalEngine`] is a
//! filesystem-backed engine for single-host use and tests.

pub mod engine;
pub mod error;
pub mod local;
pub mod orchestrator;

pub use engine::{
    event_channel, EventSink, EventStream, Publication, Snapshot, Torrent, TorrentEngine,
    TorrentEvent,
};
pub use error::{EngineError, SyncError};
pub use local::LocalEngine;
pub use orchestrator::{KeySource, Orchestrator, PushOptions, SyncHandle, SyncState};
