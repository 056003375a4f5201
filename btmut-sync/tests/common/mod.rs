//! Shared fixtures for orchestrator integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use btmut_core::{InfoHash, Magnet, PublicKey, SecretKey};
use btmut_sync::{
    event_channel, EngineError, Publication, Snapshot, Torrent, TorrentEngine, TorrentEvent,
};

pub fn write(dir: &Path, rel: &str, body: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

pub fn hash(n: u8) -> InfoHash {
    InfoHash::from_bytes([n; 20])
}

/// Scriptable engine: queue the info-hashes snapshots return and the
/// sequences publishes return, force failures, or make a call hang forever.
#[derive(Debug, Default, Clone)]
pub struct MockEngine {
    inner: Arc<Mutex<MockEngineInner>>,
}

#[derive(Debug, Default)]
struct MockEngineInner {
    snapshot_hashes: VecDeque<InfoHash>,
    sequences: VecDeque<u64>,
    next_auto_sequence: u64,
    fail_next_publish: Option<String>,
    fail_next_resolve: Option<String>,
    stall_next_publish: bool,
    stall_next_resolve: bool,
    published: Vec<(PublicKey, InfoHash, u64)>,
    resolved: Vec<(Magnet, PathBuf)>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_snapshot(&self, info_hash: InfoHash) {
        self.inner.lock().unwrap().snapshot_hashes.push_back(info_hash);
    }

    pub fn queue_sequence(&self, seq: u64) {
        self.inner.lock().unwrap().sequences.push_back(seq);
    }

    pub fn fail_next_publish(&self, reason: &str) {
        self.inner.lock().unwrap().fail_next_publish = Some(reason.to_string());
    }

    pub fn fail_next_resolve(&self, reason: &str) {
        self.inner.lock().unwrap().fail_next_resolve = Some(reason.to_string());
    }

    /// The next `publish` never completes.
    pub fn stall_next_publish(&self) {
        self.inner.lock().unwrap().stall_next_publish = true;
    }

    /// The next `resolve` never completes.
    pub fn stall_next_resolve(&self) {
        self.inner.lock().unwrap().stall_next_resolve = true;
    }

    pub fn published(&self) -> Vec<(PublicKey, InfoHash, u64)> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn resolved(&self) -> Vec<(Magnet, PathBuf)> {
        self.inner.lock().unwrap().resolved.clone()
    }
}

#[async_trait]
impl TorrentEngine for MockEngine {
    async fn resolve(&self, magnet: &Magnet, destination: &Path) -> Result<Torrent, EngineError> {
        let stall = std::mem::take(&mut self.inner.lock().unwrap().stall_next_resolve);
        if stall {
            std::future::pending::<()>().await;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.fail_next_resolve.take() {
            return Err(EngineError::NotFound(reason));
        }
        inner
            .resolved
            .push((magnet.clone(), destination.to_path_buf()));
        let info_hash = magnet.info_hash.unwrap_or_else(|| hash(0xee));
        let sequence = magnet.public_key.map(|_| 0);

        let (tx, rx) = event_channel();
        let _ = tx.send(TorrentEvent::Wire {
            peer: "127.0.0.1:6881".into(),
        });
        let _ = tx.send(TorrentEvent::Done);
        Ok(Torrent {
            magnet: Magnet::immutable(info_hash),
            info_hash,
            public_key: magnet.public_key,
            sequence,
            progress: 1.0,
            files: vec![],
            events: rx,
        })
    }

    async fn snapshot_directory(&self, _path: &Path) -> Result<Snapshot, EngineError> {
        let info_hash = self
            .inner
            .lock()
            .unwrap()
            .snapshot_hashes
            .pop_front()
            .unwrap_or_else(|| hash(0x11));
        let (tx, rx) = event_channel();
        let _ = tx.send(TorrentEvent::Done);
        Ok(Snapshot {
            info_hash,
            files: vec![],
            events: rx,
        })
    }

    async fn publish(
        &self,
        public_key: &PublicKey,
        _secret_key: &SecretKey,
        info_hash: &InfoHash,
    ) -> Result<Publication, EngineError> {
        let stall = std::mem::take(&mut self.inner.lock().unwrap().stall_next_publish);
        if stall {
            std::future::pending::<()>().await;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.fail_next_publish.take() {
            return Err(EngineError::Rejected(reason));
        }
        let seq = match inner.sequences.pop_front() {
            Some(seq) => seq,
            None => {
                let seq = inner.next_auto_sequence;
                inner.next_auto_sequence += 1;
                seq
            }
        };
        inner.published.push((*public_key, *info_hash, seq));
        Ok(Publication {
            magnet: Magnet::immutable(*info_hash).with_public_key(*public_key),
            sequence: seq,
        })
    }

    async fn current_sequence(&self, public_key: &PublicKey) -> Result<Option<u64>, EngineError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .published
            .iter()
            .filter(|(key, _, _)| key == public_key)
            .map(|(_, _, seq)| *seq)
            .max())
    }
}
