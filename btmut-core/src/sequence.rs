//! Sequence guard: strictly increasing versions per owner key.
//!
//! The guard is the only authority on whether a publication sequence is
//! new. It lives in memory and can be persisted as JSON at
//! `<secret_storage>/sequences.json` so replays are caught across processes.
//! Persistence uses the same `.tmp` + rename pattern as the vault. Several
//! processes may share one store: saves merge with the file under a lock,
//! and [`SequenceGuard::reload_at`] picks up what others recorded.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::PublicKey;

/// File name of the persisted guard inside the secret storage root.
pub const SEQUENCE_FILE_NAME: &str = "sequences.json";

const LOCK_FILE_NAME: &str = "sequences.lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(20);
const LOCK_STALE: Duration = Duration::from_secs(30);

/// Last accepted sequence for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub seq: u64,
    pub accepted_at: DateTime<Utc>,
}

/// On-disk payload: public key hex → record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFile {
    #[serde(default)]
    pub sequences: HashMap<String, SequenceRecord>,
}

#[derive(Debug, Default)]
pub struct SequenceGuard {
    records: Mutex<HashMap<PublicKey, SequenceRecord>>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<PublicKey, SequenceRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record `proposed` for `key` iff it is strictly greater than the last
    /// recorded value, or nothing is recorded yet. Otherwise leaves state alone.
    pub fn accept(&self, key: &PublicKey, proposed: u64) -> bool {
        let mut records = self.records();
        match records.get(key) {
            Some(last) if proposed <= last.seq => {
                tracing::warn!(
                    public_key = %key,
                    proposed,
                    latest = last.seq,
                    "sequence guard rejected stale sequence"
                );
                false
            }
            _ => {
                records.insert(
                    *key,
                    SequenceRecord {
                        seq: proposed,
                        accepted_at: Utc::now(),
                    },
                );
                true
            }
        }
    }

    /// Whether `proposed` would be accepted, without recording it.
    pub fn admits(&self, key: &PublicKey, proposed: u64) -> bool {
        self.records()
            .get(key)
            .map_or(true, |last| proposed > last.seq)
    }

    /// Record `seq` if newer; an older or equal value is ignored silently.
    pub fn observe(&self, key: &PublicKey, seq: u64) -> bool {
        if self.admits(key, seq) {
            self.accept(key, seq)
        } else {
            false
        }
    }

    pub fn latest(&self, key: &PublicKey) -> Option<u64> {
        self.records().get(key).map(|r| r.seq)
    }

    /// The smallest sequence the guard would accept next.
    pub fn next(&self, key: &PublicKey) -> u64 {
        self.latest(key).map_or(0, |s| s.saturating_add(1))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load from `<root>/sequences.json`; empty if the file does not exist.
    /// Entries whose key fails to parse are skipped.
    pub fn load_at(root: &Path) -> Result<Self, CoreError> {
        Ok(Self {
            records: Mutex::new(read_store(root)?),
        })
    }

    /// Merge what other processes have saved under `root` into memory.
    /// Per key, the higher sequence wins.
    pub fn reload_at(&self, root: &Path) -> Result<(), CoreError> {
        let on_disk = read_store(root)?;
        merge_newer(&mut self.records(), on_disk);
        Ok(())
    }

    /// Save to `<root>/sequences.json` atomically.
    ///
    /// Holds `<root>/sequences.lock` while it re-reads the file, merges it
    /// with memory (per-key max) and renames the result into place, so
    /// concurrent savers never drop each other's entries.
    pub fn save_at(&self, root: &Path) -> Result<(), CoreError> {
        std::fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
        let _lock = StoreLock::acquire(root)?;

        let on_disk = read_store(root)?;
        let file = {
            let mut records = self.records();
            merge_newer(&mut records, on_disk);
            SequenceFile {
                sequences: records
                    .iter()
                    .map(|(key, record)| (key.to_hex(), *record))
                    .collect(),
            }
        };
        let json = serde_json::to_string_pretty(&file)?;
        let path = store_path_at(root);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }
}

fn read_store(root: &Path) -> Result<HashMap<PublicKey, SequenceRecord>, CoreError> {
    let path = store_path_at(root);
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let file: SequenceFile = serde_json::from_str(&contents)?;
    Ok(file
        .sequences
        .into_iter()
        .filter_map(|(hex, record)| match PublicKey::from_hex(&hex) {
            Ok(key) => Some((key, record)),
            Err(e) => {
                tracing::warn!("skipping sequence entry '{hex}': {e}");
                None
            }
        })
        .collect())
}

fn merge_newer(
    records: &mut HashMap<PublicKey, SequenceRecord>,
    other: HashMap<PublicKey, SequenceRecord>,
) {
    for (key, record) in other {
        match records.get(&key) {
            Some(mine) if mine.seq >= record.seq => {}
            _ => {
                records.insert(key, record);
            }
        }
    }
}

/// Exclusive lock on the sequence store, held as a lock file.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(root: &Path) -> Result<Self, CoreError> {
        let path = root.join(LOCK_FILE_NAME);
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        tracing::warn!("removing stale lock {}", path.display());
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(io_err(&path, e));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(io_err(&path, e)),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A lock older than [`LOCK_STALE`] belongs to a process that died holding it.
fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE)
}

/// `<root>/sequences.json`. Pure, no I/O.
pub fn store_path_at(root: &Path) -> PathBuf {
    root.join(SEQUENCE_FILE_NAME)
}
