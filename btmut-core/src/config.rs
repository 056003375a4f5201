//! Storage roots, resolved once at process start.
//!
//! ```text
//! <config_dir>/bt-mut/            secret storage (vault + sequences.json)
//! <data_dir>/bt-mut/store/        local engine content and records
//! ```
//!
//! Library code never reads these defaults mid-operation; callers build a
//! [`Config`] up front and pass paths down.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Application directory name under the platform config/data dirs.
pub const APP_DIR: &str = "bt-mut";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the key vault and the persisted sequence guard.
    pub secret_storage: PathBuf,
    /// Root of the local torrent engine's content and record store.
    pub store_root: PathBuf,
}

impl Config {
    /// Defaults under explicit base directories: pure, no I/O.
    pub fn default_at(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            secret_storage: config_dir.join(APP_DIR),
            store_root: data_dir.join(APP_DIR).join("store"),
        }
    }

    /// Platform defaults via `dirs`. Data falls back to the config dir.
    pub fn resolve() -> Result<Self, CoreError> {
        let config_dir = dirs::config_dir().ok_or(CoreError::HomeNotFound)?;
        let data_dir = dirs::data_dir().unwrap_or_else(|| config_dir.clone());
        Ok(Self::default_at(&config_dir, &data_dir))
    }

    /// Apply explicit overrides on top of `self`.
    pub fn with_overrides(
        mut self,
        secret_storage: Option<PathBuf>,
        store_root: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = secret_storage {
            self.secret_storage = path;
        }
        if let Some(path) = store_root {
            self.store_root = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let cfg = Config::default_at(Path::new("/home/u/.config"), Path::new("/home/u/.local/share"));
        assert_eq!(cfg.secret_storage, PathBuf::from("/home/u/.config/bt-mut"));
        assert_eq!(cfg.store_root, PathBuf::from("/home/u/.local/share/bt-mut/store"));
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let cfg = Config::default_at(Path::new("/c"), Path::new("/d"))
            .with_overrides(Some(PathBuf::from("/secrets")), None);
        assert_eq!(cfg.secret_storage, PathBuf::from("/secrets"));
        assert_eq!(cfg.store_root, PathBuf::from("/d/bt-mut/store"));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(CoreError::HomeNotFound.to_string().contains("configuration directory"));
    }
}
