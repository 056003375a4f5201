//! Filesystem-backed torrent engine.
//!
//! Stands in for a DHT and swarm on a single host. All state lives under one
//! store root:
//!
//! ```text
//! <store_root>/
//!   content/<info_hash>/...     snapshot payload, content-addressed
//!   records/<public_key>.json   signed mutable record (latest only)
//! ```
//!
//! ## Info-hash
//!
//! SHA-256 over a manifest of `path \0 len \0 sha256(content) \n` lines, one
//! per file in sorted relative-path order, truncated to 20 bytes. The pointer
//! file at the top of the snapshotted directory is never part of a manifest.
//!
//! ## Records
//!
//! Each publish signs `3:seqi<seq>e1:v20:<info_hash>` (BEP-44 layout) with
//! the owner key and stores it with `seq = previous + 1`, or 0 for the
//! first publish. Resolution verifies the signature before trusting it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use btmut_core::{pointer, InfoHash, Magnet, PublicKey, SecretKey};

use crate::engine::{event_channel, Publication, Snapshot, Torrent, TorrentEngine, TorrentEvent};
use crate::error::{engine_io, EngineError};

/// Signed pointer from an owner key to an info-hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableRecord {
    pub public_key: PublicKey,
    pub info_hash: InfoHash,
    pub seq: u64,
    /// Hex-encoded Ed25519 signature over [`signable`].
    pub signature: String,
    pub updated_at: DateTime<Utc>,
}

/// Bytes covered by a record signature.
pub fn signable(seq: u64, info_hash: &InfoHash) -> Vec<u8> {
    let mut msg = format!("3:seqi{seq}e1:v20:").into_bytes();
    msg.extend_from_slice(info_hash.as_bytes());
    msg
}

#[derive(Debug)]
pub struct LocalEngine {
    root: PathBuf,
    /// Serializes record read-modify-write inside this process.
    publish_lock: Mutex<()>,
}

impl LocalEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            publish_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/content/<info_hash>`. Pure, no I/O.
    pub fn content_path(&self, info_hash: &InfoHash) -> PathBuf {
        self.root.join("content").join(info_hash.to_hex())
    }

    /// `<root>/records/<public_key>.json`. Pure, no I/O.
    pub fn record_path(&self, public_key: &PublicKey) -> PathBuf {
        self.root
            .join("records")
            .join(format!("{}.json", public_key.to_hex()))
    }

    /// Read and verify the current record for `public_key`, if any.
    pub fn load_record(&self, public_key: &PublicKey) -> Result<Option<MutableRecord>, EngineError> {
        let path = self.record_path(public_key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| engine_io(&path, e))?;
        let record: MutableRecord = serde_json::from_str(&contents)?;
        verify_record(public_key, &record)?;
        Ok(Some(record))
    }

    fn save_record(&self, record: &MutableRecord) -> Result<(), EngineError> {
        let path = self.record_path(&record.public_key);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| engine_io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| engine_io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| engine_io(&path, e))?;
        Ok(())
    }
}

fn verify_record(public_key: &PublicKey, record: &MutableRecord) -> Result<(), EngineError> {
    if record.public_key != *public_key {
        return Err(EngineError::InvalidRecord(format!(
            "record is for {}, expected {public_key}",
            record.public_key
        )));
    }
    let mut sig = [0u8; 64];
    hex::decode_to_slice(&record.signature, &mut sig)
        .map_err(|e| EngineError::InvalidRecord(format!("signature hex: {e}")))?;
    let verifying = public_key
        .verifying_key()
        .map_err(|e| EngineError::InvalidRecord(e.to_string()))?;
    verifying
        .verify(
            &signable(record.seq, &record.info_hash),
            &Signature::from_bytes(&sig),
        )
        .map_err(|e| EngineError::InvalidRecord(format!("bad signature: {e}")))
}

#[async_trait::async_trait]
impl TorrentEngine for LocalEngine {
    async fn resolve(&self, magnet: &Magnet, destination: &Path) -> Result<Torrent, EngineError> {
        let (info_hash, sequence) = match &magnet.public_key {
            Some(key) => {
                let record = self
                    .load_record(key)?
                    .ok_or_else(|| EngineError::NotFound(format!("publication {key}")))?;
                (record.info_hash, Some(record.seq))
            }
            None => match magnet.info_hash {
                Some(hash) => (hash, None),
                None => return Err(EngineError::NotFound("info-hash in magnet".into())),
            },
        };

        let source = self.content_path(&info_hash);
        if !source.is_dir() {
            return Err(EngineError::NotFound(format!("content for {info_hash}")));
        }
        let files = list_files(&source, false).map_err(|e| engine_io(&source, e))?;
        let progress = local_progress(&source, destination, &files);

        let (tx, rx) = event_channel();
        let dest = destination.to_path_buf();
        let copy_list = files.clone();
        tokio::task::spawn_blocking(move || {
            for rel in &copy_list {
                match copy_one(&source, &dest, rel) {
                    Ok(bytes) => {
                        let _ = tx.send(TorrentEvent::Download {
                            path: rel.clone(),
                            bytes,
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(TorrentEvent::Failed {
                            reason: format!("{}: {e}", rel.display()),
                        });
                        return;
                    }
                }
            }
            let _ = tx.send(TorrentEvent::Done);
        });

        tracing::debug!("resolved {} to {info_hash}", magnet);
        Ok(Torrent {
            magnet: magnet.clone().without_public_key().with_info_hash(info_hash),
            info_hash,
            public_key: magnet.public_key,
            sequence,
            progress,
            files,
            events: rx,
        })
    }

    async fn snapshot_directory(&self, path: &Path) -> Result<Snapshot, EngineError> {
        let dir = path.to_path_buf();
        let content_root = self.root.join("content");
        let (info_hash, files) = tokio::task::spawn_blocking(move || seed_directory(&dir, &content_root))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;

        let (tx, rx) = event_channel();
        let _ = tx.send(TorrentEvent::Done);
        tracing::debug!("snapshot of {} is {info_hash}", path.display());
        Ok(Snapshot {
            info_hash,
            files,
            events: rx,
        })
    }

    async fn publish(
        &self,
        public_key: &PublicKey,
        secret_key: &SecretKey,
        info_hash: &InfoHash,
    ) -> Result<Publication, EngineError> {
        if secret_key.public_key() != *public_key {
            return Err(EngineError::Rejected(format!(
                "secret key does not sign for {public_key}"
            )));
        }
        if !self.content_path(info_hash).is_dir() {
            return Err(EngineError::NotFound(format!("content for {info_hash}")));
        }

        let _lock = self.publish_lock.lock().await;
        let seq = match self.load_record(public_key)? {
            Some(previous) => previous.seq + 1,
            None => 0,
        };
        let signature = secret_key
            .signing_key()
            .sign(&signable(seq, info_hash));
        let record = MutableRecord {
            public_key: *public_key,
            info_hash: *info_hash,
            seq,
            signature: hex::encode(signature.to_bytes()),
            updated_at: Utc::now(),
        };
        self.save_record(&record)?;
        tracing::info!(public_key = %public_key, seq, "published {info_hash}");

        Ok(Publication {
            magnet: Magnet::immutable(*info_hash).with_public_key(*public_key),
            sequence: seq,
        })
    }

    async fn current_sequence(&self, public_key: &PublicKey) -> Result<Option<u64>, EngineError> {
        Ok(self.load_record(public_key)?.map(|record| record.seq))
    }
}

// ---------------------------------------------------------------------------
// Blocking helpers
// ---------------------------------------------------------------------------

/// Relative paths of regular files under `root`, sorted.
/// With `skip_pointer`, reserved pointer names at the top level are left out.
fn list_files(root: &Path, skip_pointer: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, Path::new(""), skip_pointer, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Path, rel: &Path, skip_pointer: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root.join(rel))? {
        let entry = entry?;
        let name = entry.file_name();
        if skip_pointer && rel.as_os_str().is_empty() && pointer::is_reserved(&name.to_string_lossy()) {
            continue;
        }
        let child = rel.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &child, skip_pointer, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

fn hash_file(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let len = std::io::copy(&mut file, &mut hasher)?;
    Ok((len, hex::encode(hasher.finalize())))
}

/// Hash `dir` and copy it into `<content_root>/<info_hash>` unless already there.
fn seed_directory(dir: &Path, content_root: &Path) -> Result<(InfoHash, Vec<PathBuf>), EngineError> {
    let files = list_files(dir, true).map_err(|e| engine_io(dir, e))?;

    let mut manifest = Sha256::new();
    for rel in &files {
        let abs = dir.join(rel);
        let (len, digest) = hash_file(&abs).map_err(|e| engine_io(&abs, e))?;
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        manifest.update(format!("{rel_str}\0{len}\0{digest}\n").as_bytes());
    }
    let digest = manifest.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[..20]);
    let info_hash = InfoHash::from_bytes(bytes);

    let target = content_root.join(info_hash.to_hex());
    if !target.is_dir() {
        let partial = content_root.join(format!("{}.partial", info_hash.to_hex()));
        if partial.exists() {
            std::fs::remove_dir_all(&partial).map_err(|e| engine_io(&partial, e))?;
        }
        std::fs::create_dir_all(&partial).map_err(|e| engine_io(&partial, e))?;
        for rel in &files {
            copy_one(dir, &partial, rel).map_err(|e| engine_io(dir.join(rel), e))?;
        }
        if let Err(e) = std::fs::rename(&partial, &target) {
            let _ = std::fs::remove_dir_all(&partial);
            // Another snapshot of identical content may have landed first.
            if !target.is_dir() {
                return Err(engine_io(&target, e));
            }
        }
    }
    Ok((info_hash, files))
}

/// Fraction of the snapshot's bytes already present, verified, under `dest`.
/// An empty snapshot is complete.
fn local_progress(source: &Path, dest: &Path, files: &[PathBuf]) -> f64 {
    let mut total = 0u64;
    let mut present = 0u64;
    for rel in files {
        let Ok((len, digest)) = hash_file(&source.join(rel)) else {
            continue;
        };
        total += len;
        let local = dest.join(rel);
        let same_len = std::fs::metadata(&local).is_ok_and(|m| m.len() == len);
        if same_len && hash_file(&local).is_ok_and(|(_, d)| d == digest) {
            present += len;
        }
    }
    if total == 0 {
        1.0
    } else {
        present as f64 / total as f64
    }
}

fn copy_one(from_root: &Path, to_root: &Path, rel: &Path) -> std::io::Result<u64> {
    let to = to_root.join(rel);
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from_root.join(rel), to)
}
