//! Error types for btmut-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from local state operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error in the sequence store.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A pointer file or vault entry that was expected to exist does not.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The identifier is not a syntactically valid magnet string.
    #[error("malformed identifier '{identifier}': {reason}")]
    MalformedIdentifier { identifier: String, reason: String },

    /// Key bytes of the wrong length or encoding.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Neither a config nor a data directory could be determined.
    #[error("cannot determine user configuration directory; set $HOME or pass explicit paths")]
    HomeNotFound,
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn malformed(identifier: &str, reason: impl Into<String>) -> CoreError {
    CoreError::MalformedIdentifier {
        identifier: identifier.to_owned(),
        reason: reason.into(),
    }
}
