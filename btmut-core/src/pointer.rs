//! Pointer file: the one magnet a directory tracks.
//!
//! Stored as UTF-8 text at `<dir>/.bt`. Writes go through `<dir>/.bt.tmp` and
//! a rename, so a crash never leaves a half-written pointer behind.
//! Snapshots built from `<dir>` must skip [`POINTER_FILE_NAME`].

use std::path::{Path, PathBuf};

use crate::error::{io_err, malformed, CoreError};
use crate::magnet::Magnet;

/// Reserved file name of the pointer inside a synchronized directory.
pub const POINTER_FILE_NAME: &str = ".bt";

const POINTER_TMP_NAME: &str = ".bt.tmp";

/// `<dir>/.bt`. Pure, no I/O.
pub fn pointer_path(dir: &Path) -> PathBuf {
    dir.join(POINTER_FILE_NAME)
}

/// True if `name` is reserved by the pointer file and must not be snapshotted.
pub fn is_reserved(name: &str) -> bool {
    name == POINTER_FILE_NAME || name == POINTER_TMP_NAME
}

pub fn exists(dir: &Path) -> bool {
    pointer_path(dir).is_file()
}

/// Read the raw identifier string.
///
/// Returns [`CoreError::NotFound`] if the directory has no pointer, and
/// [`CoreError::MalformedIdentifier`] if its bytes are not UTF-8.
pub fn read(dir: &Path) -> Result<String, CoreError> {
    let path = pointer_path(dir);
    if !path.is_file() {
        return Err(CoreError::NotFound { path });
    }
    let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
    let contents = String::from_utf8(bytes).map_err(|e| {
        malformed(
            String::from_utf8_lossy(e.as_bytes()).trim_end(),
            format!("{} is not UTF-8: {}", path.display(), e.utf8_error()),
        )
    })?;
    Ok(contents.trim_end().to_owned())
}

/// Read and decode the pointer.
pub fn load(dir: &Path) -> Result<Magnet, CoreError> {
    Magnet::decode(&read(dir)?)
}

/// Atomically replace the pointer with `identifier`.
pub fn write(dir: &Path, identifier: &str) -> Result<(), CoreError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let path = pointer_path(dir);
    let tmp = dir.join(POINTER_TMP_NAME);
    std::fs::write(&tmp, identifier).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    tracing::debug!("wrote pointer: {}", path.display());
    Ok(())
}

/// Encode and write `magnet`.
pub fn save(dir: &Path, magnet: &Magnet) -> Result<(), CoreError> {
    write(dir, &magnet.encode())
}
