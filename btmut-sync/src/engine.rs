//! Torrent engine abstraction.
//!
//! The engine owns info-hash computation, DHT storage and the swarm. The
//! orchestrator only ever talks to it through [`TorrentEngine`]:
//!
//! - `resolve()` turns a magnet (owned or not) into a live torrent in a directory
//! - `snapshot_directory()` hashes a directory and starts seeding it
//! - `publish()` points an owner key at an info-hash and reports the sequence
//! - `current_sequence()` reads the sequence a publication is at right now
//! - `generate_keypair()` creates owner keys
//!
//! Transfer progress arrives on an [`EventStream`] the orchestrator forwards
//! to its caller unmodified.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use btmut_core::{InfoHash, Keypair, Magnet, PublicKey, SecretKey};

use crate::error::EngineError;

/// Transfer events for one torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentEvent {
    /// A peer connected.
    Wire { peer: String },
    /// A file (relative path) finished transferring.
    Download { path: PathBuf, bytes: u64 },
    /// All content is present and verified; the torrent is now seeding.
    Done,
    /// The transfer stopped before completion.
    Failed { reason: String },
}

pub type EventStream = mpsc::UnboundedReceiver<TorrentEvent>;
pub type EventSink = mpsc::UnboundedSender<TorrentEvent>;

/// Create a connected event sink/stream pair.
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// A torrent resolved into a destination directory.
#[derive(Debug)]
pub struct Torrent {
    /// The resolved, directly fetchable identifier (no owner extension).
    pub magnet: Magnet,
    pub info_hash: InfoHash,
    /// Owner key, when the torrent was resolved from a mutable publication.
    pub public_key: Option<PublicKey>,
    /// Sequence of the mutable record that was resolved, if any.
    pub sequence: Option<u64>,
    /// Fraction of content present locally when resolution returned.
    pub progress: f64,
    /// Relative paths of the files in the snapshot.
    pub files: Vec<PathBuf>,
    pub events: EventStream,
}

/// A directory snapshot being seeded.
#[derive(Debug)]
pub struct Snapshot {
    pub info_hash: InfoHash,
    pub files: Vec<PathBuf>,
    pub events: EventStream,
}

/// Result of a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub magnet: Magnet,
    /// Sequence assigned to this publication by the engine.
    pub sequence: u64,
}

#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Resolve `magnet` and start fetching it into `destination`.
    ///
    /// Owned magnets are first resolved to the publication's current info-hash.
    async fn resolve(&self, magnet: &Magnet, destination: &Path) -> Result<Torrent, EngineError>;

    /// Hash `path` into a snapshot and start seeding it.
    ///
    /// Must skip the pointer file inside `path`.
    async fn snapshot_directory(&self, path: &Path) -> Result<Snapshot, EngineError>;

    /// Point `public_key` at `info_hash`.
    async fn publish(
        &self,
        public_key: &PublicKey,
        secret_key: &SecretKey,
        info_hash: &InfoHash,
    ) -> Result<Publication, EngineError>;

    /// Sequence of the publication currently stored for `public_key`, or
    /// `None` if nothing was ever published under it.
    async fn current_sequence(&self, public_key: &PublicKey) -> Result<Option<u64>, EngineError>;

    /// Generate an owner keypair; deterministic when `seed` is given.
    fn generate_keypair(&self, seed: Option<[u8; 32]>) -> Result<Keypair, EngineError> {
        match seed {
            Some(seed) => Ok(Keypair::from_seed(seed)),
            None => Keypair::generate().map_err(|e| EngineError::Task(e.to_string())),
        }
    }
}
