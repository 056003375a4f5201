//! Sync orchestrator: the per-directory state machine.
//!
//! ```text
//!                    sync(dir), no pointer
//! UNINITIALIZED ──────────────────────────▶ CREATING ──▶ OWNED_READY
//!       │                                                    ▲
//!       │ pull(dir, magnet)                    push / sync with secret
//!       ▼                                                    │
//! TRACKING_IMMUTABLE / TRACKING_MUTABLE ◀── sync without secret
//!
//! any state ── pointer fails to decode ──▶ ERROR (terminal for the call)
//! ```
//!
//! Outside a call, the state is derived from the pointer file and the vault,
//! so a repaired pointer leaves `ERROR` on its own.
//!
//! Ordering rules every operation follows:
//!
//! 1. Before `publish()`, the guard is refreshed from disk and compared with
//!    the sequence the engine currently holds for the key. A publication this
//!    host has not seen yet is a conflict. After `publish()`, the guard must
//!    accept the sequence the engine returns.
//! 2. The pointer file is written only after the engine confirmed the
//!    publish or resolve, so a failed or abandoned call leaves it untouched.
//! 3. Calls on the same directory run one at a time; other directories are
//!    never blocked.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use btmut_core::{
    pointer, InfoHash, KeyVault, Keypair, Magnet, PublicKey, SecretKey, SequenceGuard,
};

use crate::engine::{EventStream, TorrentEngine, TorrentEvent};
use crate::error::{EngineError, SyncError};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Uninitialized,
    Creating,
    OwnedReady,
    TrackingImmutable,
    TrackingMutable,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Uninitialized => "UNINITIALIZED",
            SyncState::Creating => "CREATING",
            SyncState::OwnedReady => "OWNED_READY",
            SyncState::TrackingImmutable => "TRACKING_IMMUTABLE",
            SyncState::TrackingMutable => "TRACKING_MUTABLE",
            SyncState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Push options
// ---------------------------------------------------------------------------

/// Key material for a push.
///
/// - `seed` derives a keypair deterministically.
/// - `public_key` + `secret_key` are used verbatim and must both be present
///   or both absent; the secret must derive the public key.
/// - `seed` and an explicit pair are mutually exclusive.
///
/// With nothing set, a fresh keypair is generated for a new publication and
/// the vault supplies the secret for an existing one.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub seed: Option<[u8; 32]>,
    pub public_key: Option<PublicKey>,
    pub secret_key: Option<SecretKey>,
}

/// Validated form of [`PushOptions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Generate,
    Seed([u8; 32]),
    Explicit(Keypair),
}

impl PushOptions {
    pub fn validate(&self) -> Result<KeySource, SyncError> {
        match (&self.seed, &self.public_key, &self.secret_key) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(SyncError::InvalidArguments(
                "seed cannot be combined with an explicit keypair".into(),
            )),
            (Some(seed), None, None) => Ok(KeySource::Seed(*seed)),
            (None, Some(public), Some(secret)) => Keypair::from_parts(*public, secret.clone())
                .map(KeySource::Explicit)
                .map_err(|e| SyncError::InvalidArguments(e.to_string())),
            (None, Some(_), None) => Err(SyncError::InvalidArguments(
                "public key given without secret key".into(),
            )),
            (None, None, Some(_)) => Err(SyncError::InvalidArguments(
                "secret key given without public key".into(),
            )),
            (None, None, None) => Ok(KeySource::Generate),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A live sync: what the directory now tracks, plus the engine's event stream.
#[derive(Debug)]
pub struct SyncHandle {
    pub directory: PathBuf,
    /// The identifier written to the pointer file.
    pub magnet: Magnet,
    pub info_hash: InfoHash,
    pub public_key: Option<PublicKey>,
    pub sequence: Option<u64>,
    /// Fraction of the content present locally when the call returned.
    pub progress: f64,
    pub files: Vec<PathBuf>,
    /// States this call moved through, starting with the one it found.
    pub transitions: Vec<SyncState>,
    events: EventStream,
}

impl SyncHandle {
    pub fn magnet_uri(&self) -> String {
        self.magnet.encode()
    }

    pub fn state(&self) -> SyncState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(SyncState::Uninitialized)
    }

    /// Next engine event, as the engine reported it. `None` once the engine is finished.
    pub async fn next_event(&mut self) -> Option<TorrentEvent> {
        self.events.recv().await
    }

    /// Drain events until the transfer completes.
    pub async fn wait_done(&mut self) -> Result<(), SyncError> {
        while let Some(event) = self.events.recv().await {
            match event {
                TorrentEvent::Done => return Ok(()),
                TorrentEvent::Failed { reason } => {
                    return Err(SyncError::EngineFailure(EngineError::Transfer(reason)))
                }
                TorrentEvent::Wire { .. } | TorrentEvent::Download { .. } => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<E> {
    engine: E,
    secret_storage: PathBuf,
    guard: SequenceGuard,
    locks: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Per-call record of state transitions.
struct Trail {
    dir: PathBuf,
    states: Vec<SyncState>,
}

impl<E: TorrentEngine> Orchestrator<E> {
    /// Build an orchestrator, loading the persisted sequence guard from
    /// `secret_storage`.
    pub fn new(engine: E, secret_storage: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let secret_storage = secret_storage.into();
        let guard = SequenceGuard::load_at(&secret_storage)?;
        Ok(Self {
            engine,
            secret_storage,
            guard,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn guard(&self) -> &SequenceGuard {
        &self.guard
    }

    pub fn vault(&self) -> KeyVault {
        KeyVault::new(&self.secret_storage)
    }

    /// True once `dir` has a pointer file.
    pub fn is_initialized(&self, dir: &Path) -> bool {
        pointer::exists(dir)
    }

    /// Current state of `dir`, derived from its pointer file and the vault.
    pub fn state(&self, dir: &Path) -> SyncState {
        if !pointer::exists(dir) {
            return SyncState::Uninitialized;
        }
        match pointer::load(dir) {
            Err(_) => SyncState::Error,
            Ok(magnet) => match magnet.public_key {
                None => SyncState::TrackingImmutable,
                Some(key) if self.vault().has(&key) => SyncState::OwnedReady,
                Some(_) => SyncState::TrackingMutable,
            },
        }
    }

    /// Publish, push or pull `dir`, whichever its local state calls for.
    ///
    /// With `identifier`, always a pull into `dir`.
    pub async fn sync(&self, dir: &Path, identifier: Option<&str>) -> Result<SyncHandle, SyncError> {
        self.sync_with(dir, identifier, &PushOptions::default()).await
    }

    /// [`sync`](Self::sync) with key material for a new publication.
    pub async fn sync_with(
        &self,
        dir: &Path,
        identifier: Option<&str>,
        opts: &PushOptions,
    ) -> Result<SyncHandle, SyncError> {
        if identifier.is_some() {
            return self.pull(dir, identifier).await;
        }

        let lock = self.dir_lock(dir);
        let _held = lock.lock().await;
        let mut trail = self.trail(dir);

        if !pointer::exists(dir) {
            let source = opts.validate()?;
            return self.create_locked(dir, source, &mut trail).await;
        }

        let magnet = self.load_pointer(dir, &mut trail)?;
        match magnet.public_key {
            None => self.pull_locked(dir, magnet, &mut trail).await,
            Some(key) => {
                let vault = self.vault().with_supplied(explicit_pair(opts)?);
                if vault.has(&key) {
                    let pair = vault.load_keypair(&key)?;
                    self.publish_locked(dir, pair, &mut trail).await
                } else {
                    tracing::debug!("no secret for {key}; pulling {} read-only", dir.display());
                    self.pull_locked(dir, magnet, &mut trail).await
                }
            }
        }
    }

    /// Publish the current contents of `dir` to its owned publication,
    /// creating the publication first if `dir` is untracked.
    pub async fn push(&self, dir: &Path, opts: &PushOptions) -> Result<SyncHandle, SyncError> {
        let source = opts.validate()?;

        let lock = self.dir_lock(dir);
        let _held = lock.lock().await;
        let mut trail = self.trail(dir);

        if !pointer::exists(dir) {
            return self.create_locked(dir, source, &mut trail).await;
        }

        let magnet = self.load_pointer(dir, &mut trail)?;
        let key = magnet
            .public_key
            .ok_or_else(|| SyncError::ImmutablePublication {
                dir: dir.to_path_buf(),
            })?;
        let supplied = match source {
            KeySource::Explicit(pair) => Some(pair),
            KeySource::Seed(seed) => Some(Keypair::from_seed(seed)),
            KeySource::Generate => None,
        };
        let pair = self.vault().with_supplied(supplied).load_keypair(&key)?;
        self.publish_locked(dir, pair, &mut trail).await
    }

    /// Track `identifier` (or the existing pointer) in `dir` and fetch it.
    pub async fn pull(&self, dir: &Path, identifier: Option<&str>) -> Result<SyncHandle, SyncError> {
        let lock = self.dir_lock(dir);
        let _held = lock.lock().await;
        let mut trail = self.trail(dir);

        let magnet = match identifier {
            Some(identifier) => Magnet::decode(identifier)?,
            None if pointer::exists(dir) => self.load_pointer(dir, &mut trail)?,
            None => {
                return Err(SyncError::NotInitialized {
                    dir: dir.to_path_buf(),
                })
            }
        };
        self.pull_locked(dir, magnet, &mut trail).await
    }

    // -----------------------------------------------------------------------
    // Locked bodies
    // -----------------------------------------------------------------------

    async fn create_locked(
        &self,
        dir: &Path,
        source: KeySource,
        trail: &mut Trail,
    ) -> Result<SyncHandle, SyncError> {
        self.enter(trail, SyncState::Creating);
        let pair = match source {
            KeySource::Explicit(pair) => pair,
            KeySource::Seed(seed) => self.engine.generate_keypair(Some(seed))?,
            KeySource::Generate => self.engine.generate_keypair(None)?,
        };
        self.vault().save(pair.public(), pair.secret())?;
        tracing::info!(public_key = %pair.public(), "creating publication for {}", dir.display());
        self.publish_locked(dir, pair, trail).await
    }

    async fn publish_locked(
        &self,
        dir: &Path,
        pair: Keypair,
        trail: &mut Trail,
    ) -> Result<SyncHandle, SyncError> {
        let key = *pair.public();
        self.check_not_behind(&key).await?;
        let snapshot = self.engine.snapshot_directory(dir).await?;

        let publication = self
            .engine
            .publish(&key, pair.secret(), &snapshot.info_hash)
            .await?;

        if !self.guard.accept(&key, publication.sequence) {
            return Err(SyncError::SequenceConflict {
                public_key: key,
                proposed: publication.sequence,
                latest: self.guard.latest(&key).unwrap_or_default(),
            });
        }
        self.guard.save_at(&self.secret_storage)?;

        let magnet = publication
            .magnet
            .with_info_hash(snapshot.info_hash)
            .with_public_key(key);
        pointer::save(dir, &magnet)?;
        self.enter(trail, SyncState::OwnedReady);
        tracing::info!(
            public_key = %key,
            seq = publication.sequence,
            "pushed {} as {}",
            dir.display(),
            snapshot.info_hash
        );

        Ok(SyncHandle {
            directory: dir.to_path_buf(),
            magnet,
            info_hash: snapshot.info_hash,
            public_key: Some(key),
            sequence: Some(publication.sequence),
            progress: 1.0,
            files: snapshot.files,
            transitions: std::mem::take(&mut trail.states),
            events: snapshot.events,
        })
    }

    async fn pull_locked(
        &self,
        dir: &Path,
        magnet: Magnet,
        trail: &mut Trail,
    ) -> Result<SyncHandle, SyncError> {
        let torrent = self.engine.resolve(&magnet, dir).await?;

        let owner = magnet.public_key.or(torrent.public_key);
        if let (Some(key), Some(seq)) = (owner, torrent.sequence) {
            if self.guard.observe(&key, seq) {
                self.guard.save_at(&self.secret_storage)?;
            }
        }

        let resolved = match owner {
            Some(key) => torrent.magnet.with_public_key(key),
            None => torrent.magnet,
        };
        pointer::save(dir, &resolved)?;
        self.enter(
            trail,
            if owner.is_some() {
                SyncState::TrackingMutable
            } else {
                SyncState::TrackingImmutable
            },
        );
        tracing::info!("pulling {} into {}", torrent.info_hash, dir.display());

        Ok(SyncHandle {
            directory: dir.to_path_buf(),
            magnet: resolved,
            info_hash: torrent.info_hash,
            public_key: owner,
            sequence: torrent.sequence,
            progress: torrent.progress,
            files: torrent.files,
            transitions: std::mem::take(&mut trail.states),
            events: torrent.events,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Fail with `SequenceConflict` if the engine holds a publication for
    /// `key` newer than anything this host has accepted or observed.
    async fn check_not_behind(&self, key: &PublicKey) -> Result<(), SyncError> {
        self.guard.reload_at(&self.secret_storage)?;
        let Some(remote) = self.engine.current_sequence(key).await? else {
            return Ok(());
        };
        match self.guard.latest(key) {
            Some(known) if known >= remote => Ok(()),
            known => {
                tracing::warn!(
                    public_key = %key,
                    remote,
                    known = ?known,
                    "publication moved on without us; pull before pushing"
                );
                Err(SyncError::SequenceConflict {
                    public_key: *key,
                    proposed: self.guard.next(key),
                    latest: remote,
                })
            }
        }
    }

    /// Decode the pointer, entering `ERROR` if it is corrupt.
    fn load_pointer(&self, dir: &Path, trail: &mut Trail) -> Result<Magnet, SyncError> {
        pointer::load(dir).map_err(|e| {
            if matches!(e, btmut_core::CoreError::MalformedIdentifier { .. }) {
                self.enter(trail, SyncState::Error);
                tracing::error!("pointer in {} is corrupt: {e}", dir.display());
            }
            SyncError::from(e)
        })
    }

    fn trail(&self, dir: &Path) -> Trail {
        Trail {
            dir: dir_key(dir),
            states: vec![self.state(dir)],
        }
    }

    fn enter(&self, trail: &mut Trail, state: SyncState) {
        if let Some(previous) = trail.states.last() {
            tracing::debug!("{}: {previous} -> {state}", trail.dir.display());
        }
        trail.states.push(state);
    }

    fn dir_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(dir_key(dir)).or_default().clone()
    }
}

fn explicit_pair(opts: &PushOptions) -> Result<Option<Keypair>, SyncError> {
    match opts.validate()? {
        KeySource::Explicit(pair) => Ok(Some(pair)),
        KeySource::Seed(seed) => Ok(Some(Keypair::from_seed(seed))),
        KeySource::Generate => Ok(None),
    }
}

/// Stable map key for a directory.
fn dir_key(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}
