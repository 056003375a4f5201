//! `bt-mut pull [MAGNET] [-p PATH]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{block_on, orchestrator, target_dir};
use crate::GlobalArgs;

/// Download a torrent into a folder and track it.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Magnet link to follow. Omit to refresh the folder's tracked torrent.
    pub torrent: Option<String>,

    /// Destination folder. Defaults to the current path.
    #[arg(long, short = 'p')]
    pub path: Option<PathBuf>,
}

impl PullArgs {
    pub fn run(self, globals: &GlobalArgs) -> Result<()> {
        let orch = orchestrator(globals)?;
        let path = target_dir(self.path.as_deref())?;

        block_on(async {
            let mut handle = orch
                .pull(&path, self.torrent.as_deref())
                .await
                .with_context(|| format!("pull failed for '{}'", path.display()))?;
            println!(
                "Tracking {} ({:.0}% already present)",
                handle.magnet_uri(),
                handle.progress * 100.0
            );
            handle
                .wait_done()
                .await
                .with_context(|| format!("transfer into '{}' failed", path.display()))?;
            println!(
                "✓ pulled {} files into '{}'",
                handle.files.len(),
                path.display()
            );
            Ok::<_, anyhow::Error>(())
        })?
    }
}
