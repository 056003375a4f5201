//! Error types for btmut-sync.

use std::path::PathBuf;

use thiserror::Error;

use btmut_core::{CoreError, PublicKey};

/// Opaque failure reported by a torrent engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Nothing is known for the requested info-hash or owner key.
    #[error("engine could not find {0}")]
    NotFound(String),

    /// A mutable record failed signature or format checks.
    #[error("invalid publication record: {0}")]
    InvalidRecord(String),

    /// The engine refused a publish request.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// Data transfer failed after resolution.
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("engine I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine task failed: {0}")]
    Task(String),
}

/// Errors returned by orchestrator operations. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No pointer file and no identifier supplied.
    #[error("{} is not initialized; pass a magnet or publish it first", dir.display())]
    NotInitialized { dir: PathBuf },

    /// An expected secret key or pointer file is missing.
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("malformed identifier '{identifier}': {reason}")]
    MalformedIdentifier { identifier: String, reason: String },

    /// Push options that contradict each other.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Push attempted on a pointer without an owner key.
    #[error("{} tracks an immutable publication and cannot be pushed", dir.display())]
    ImmutablePublication { dir: PathBuf },

    /// Another writer published a newer version concurrently.
    #[error("sequence conflict for {public_key}: sequence {proposed} does not follow {latest}; pull before pushing again")]
    SequenceConflict {
        public_key: PublicKey,
        proposed: u64,
        latest: u64,
    },

    #[error("engine failure: {0}")]
    EngineFailure(#[from] EngineError),

    /// Local I/O or storage failure.
    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { path } => SyncError::NotFound {
                what: path.display().to_string(),
            },
            CoreError::MalformedIdentifier { identifier, reason } => {
                SyncError::MalformedIdentifier { identifier, reason }
            }
            other => SyncError::Core(other),
        }
    }
}

/// Convenience constructor for [`EngineError::Io`].
pub(crate) fn engine_io(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
