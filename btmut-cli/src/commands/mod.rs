pub mod pull;
pub mod push;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use btmut_core::Config;
use btmut_sync::{LocalEngine, Orchestrator};

use crate::GlobalArgs;

/// Resolve storage roots once: platform defaults, then flag overrides.
pub fn config(globals: &GlobalArgs) -> Result<Config> {
    let base = match (&globals.secret_storage, &globals.store) {
        (Some(secrets), Some(store)) => Config {
            secret_storage: secrets.clone(),
            store_root: store.clone(),
        },
        _ => Config::resolve().context("could not determine default storage locations")?,
    };
    Ok(base.with_overrides(globals.secret_storage.clone(), globals.store.clone()))
}

pub fn orchestrator(globals: &GlobalArgs) -> Result<Orchestrator<LocalEngine>> {
    let config = config(globals)?;
    tracing::debug!(?config, "resolved storage");
    Orchestrator::new(LocalEngine::new(config.store_root), config.secret_storage)
        .context("failed to load local sync state")
}

/// `--path` or the current directory, created if missing and made absolute.
pub fn target_dir(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().context("could not determine current directory")?,
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("cannot create '{}'", path.display()))?;
    path.canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", path.display()))
}

/// Run `fut` to completion on a fresh runtime.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(fut))
}

/// Parse 32 bytes of hex, as used by `--seed`.
pub fn parse_seed(s: &str) -> Result<[u8; 32], String> {
    let mut seed = [0u8; 32];
    hex::decode_to_slice(s.trim(), &mut seed)
        .map_err(|e| format!("seed must be 64 hex characters: {e}"))?;
    Ok(seed)
}
