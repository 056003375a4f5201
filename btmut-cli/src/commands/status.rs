//! `bt-mut status [-p PATH] [--json]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use btmut_core::pointer;

use super::{orchestrator, target_dir};
use crate::GlobalArgs;

/// Show what a folder tracks.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Folder to inspect. Defaults to the current path.
    #[arg(long, short = 'p')]
    pub path: Option<PathBuf>,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, globals: &GlobalArgs) -> Result<()> {
        let orch = orchestrator(globals)?;
        let path = target_dir(self.path.as_deref())?;
        let state = orch.state(&path);

        let magnet = if orch.is_initialized(&path) {
            Some(pointer::read(&path).context("failed to read pointer file")?)
        } else {
            None
        };
        let owner = magnet
            .as_deref()
            .and_then(|m| btmut_core::Magnet::decode(m).ok())
            .and_then(|m| m.public_key);
        let has_secret = owner.map(|k| orch.vault().has(&k)).unwrap_or(false);

        if self.json {
            let payload = serde_json::json!({
                "path": path.display().to_string(),
                "tracked": magnet.is_some(),
                "state": state.to_string(),
                "magnet": magnet,
                "owned": owner.is_some(),
                "owner": owner.map(|k| k.to_hex()),
                "has_secret": has_secret,
                "latest_sequence": owner.and_then(|k| orch.guard().latest(&k)),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        println!("{}  {state}", path.display());
        match magnet {
            None => println!("  not tracked. Run `bt-mut sync` to publish it."),
            Some(m) => {
                println!("  magnet: {m}");
                match owner {
                    Some(k) if has_secret => println!("  owner:  {k} (secret available)"),
                    Some(k) => println!("  owner:  {k} (read-only)"),
                    None => println!("  immutable snapshot"),
                }
            }
        }
        Ok(())
    }
}
