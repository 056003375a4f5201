//! `bt-mut push [-p PATH] [--seed HEX | --public-key HEX --secret-key HEX]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use btmut_core::{PublicKey, SecretKey};
use btmut_sync::PushOptions;

use super::{block_on, orchestrator, parse_seed, target_dir};
use crate::GlobalArgs;

/// Publish the folder's contents to its mutable torrent.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Folder to publish. Defaults to the current path.
    #[arg(long, short = 'p')]
    pub path: Option<PathBuf>,

    /// Derive the keypair for a new publication from this 32-byte hex seed.
    #[arg(long, value_parser = parse_seed, conflicts_with_all = ["public_key", "secret_key"])]
    pub seed: Option<[u8; 32]>,

    /// Owner public key (hex). Requires --secret-key.
    #[arg(long, requires = "secret_key")]
    pub public_key: Option<PublicKey>,

    /// Owner secret key (hex). Requires --public-key.
    #[arg(long, value_parser = parse_secret, requires = "public_key")]
    pub secret_key: Option<SecretKey>,
}

fn parse_secret(s: &str) -> Result<SecretKey, String> {
    SecretKey::from_hex(s).map_err(|e| e.to_string())
}

impl PushArgs {
    pub fn run(self, globals: &GlobalArgs) -> Result<()> {
        let orch = orchestrator(globals)?;
        let path = target_dir(self.path.as_deref())?;
        let opts = PushOptions {
            seed: self.seed,
            public_key: self.public_key,
            secret_key: self.secret_key,
        };

        let handle = block_on(orch.push(&path, &opts))?
            .with_context(|| format!("push failed for '{}'", path.display()))?;

        println!(
            "✓ pushed '{}' ({} files, sequence {})",
            path.display(),
            handle.files.len(),
            handle.sequence.unwrap_or_default()
        );
        println!("{}", handle.magnet_uri());
        Ok(())
    }
}
