//! Key vault: secret keys on disk, indexed by public key.
//!
//! # Storage layout
//!
//! ```text
//! <secret_storage>/           (mode 0700, created on first save)
//!   <public_key_hex>.key      (hex-encoded secret seed, mode 0600)
//! ```
//!
//! A keypair supplied by the caller for the current call short-circuits the
//! lookup for its own public key. The vault never indexes by secret material.

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};
use crate::types::{Keypair, PublicKey, SecretKey};

/// File extension of a vault entry.
pub const SECRET_FILE_EXTENSION: &str = "key";

/// Secret-key store rooted at one directory.
#[derive(Debug, Clone)]
pub struct KeyVault {
    root: PathBuf,
    supplied: Option<Keypair>,
}

impl KeyVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            supplied: None,
        }
    }

    /// Same vault, with a keypair supplied out-of-band for the active call.
    pub fn with_supplied(mut self, pair: Option<Keypair>) -> Self {
        self.supplied = pair;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<public_key_hex>.key`. Pure, no I/O.
    pub fn entry_path(&self, public_key: &PublicKey) -> PathBuf {
        self.root
            .join(format!("{}.{SECRET_FILE_EXTENSION}", public_key.to_hex()))
    }

    fn supplied_for(&self, public_key: &PublicKey) -> Option<&SecretKey> {
        self.supplied
            .as_ref()
            .filter(|pair| pair.public() == public_key)
            .map(Keypair::secret)
    }

    /// True iff a secret is available for `public_key`.
    pub fn has(&self, public_key: &PublicKey) -> bool {
        self.supplied_for(public_key).is_some() || self.entry_path(public_key).is_file()
    }

    /// Persist `secret` under `public_key`, creating the root if absent.
    ///
    /// Write flow: hex → `.key.tmp` sibling → `chmod 0600` → `rename`.
    /// Overwrites an existing entry; a different secret is logged as a warning.
    pub fn save(&self, public_key: &PublicKey, secret: &SecretKey) -> Result<(), CoreError> {
        self.ensure_root()?;
        let path = self.entry_path(public_key);

        if path.exists() {
            match self.read_entry(&path) {
                Ok(existing) if existing == *secret => {}
                _ => tracing::warn!(
                    public_key = %public_key,
                    "overwriting vault entry with a different secret"
                ),
            }
        }

        let tmp = path.with_extension(format!("{SECRET_FILE_EXTENSION}.tmp"));
        std::fs::write(&tmp, secret.to_hex()).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        tracing::debug!(public_key = %public_key, "saved secret to vault");
        Ok(())
    }

    /// Load the secret for `public_key`.
    ///
    /// Returns [`CoreError::NotFound`] when there is no entry and none was supplied.
    pub fn load(&self, public_key: &PublicKey) -> Result<SecretKey, CoreError> {
        if let Some(secret) = self.supplied_for(public_key) {
            return Ok(secret.clone());
        }
        let path = self.entry_path(public_key);
        if !path.is_file() {
            return Err(CoreError::NotFound { path });
        }
        self.read_entry(&path)
    }

    /// Load and pair with `public_key`, rejecting an entry that does not derive it.
    pub fn load_keypair(&self, public_key: &PublicKey) -> Result<Keypair, CoreError> {
        Keypair::from_parts(*public_key, self.load(public_key)?)
    }

    fn read_entry(&self, path: &Path) -> Result<SecretKey, CoreError> {
        let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
        SecretKey::from_stored(&bytes)
    }

    fn ensure_root(&self) -> Result<(), CoreError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
            set_dir_permissions(&self.root)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}
