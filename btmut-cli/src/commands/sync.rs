//! `bt-mut sync [MAGNET] [-p PATH]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use btmut_sync::TorrentEvent;

use super::{block_on, orchestrator, target_dir};
use crate::GlobalArgs;

/// Sync a folder with a torrent.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// A magnet link for a torrent. Omit to publish or update the folder itself.
    pub torrent: Option<String>,

    /// Where to sync the torrent. Defaults to the current path.
    #[arg(long, short = 'p')]
    pub path: Option<PathBuf>,
}

impl SyncArgs {
    pub fn run(self, globals: &GlobalArgs) -> Result<()> {
        let orch = orchestrator(globals)?;
        let path = target_dir(self.path.as_deref())?;
        let initialized = orch.is_initialized(&path);

        match &self.torrent {
            Some(torrent) => println!("Syncing {torrent} to {}", path.display()),
            None if !initialized => println!("Turning {} into torrent", path.display()),
            None => println!("Syncing torrent"),
        }

        block_on(async {
            let mut handle = orch
                .sync(&path, self.torrent.as_deref())
                .await
                .with_context(|| format!("sync failed for '{}'", path.display()))?;

            if self.torrent.is_some() {
                println!("Resolved magnet, performing sync");
            } else {
                if !initialized {
                    println!("Generated magnet:");
                }
                println!("{}", handle.magnet_uri());
            }

            while let Some(event) = handle.next_event().await {
                match event {
                    TorrentEvent::Wire { peer } => tracing::info!("got peer {peer}"),
                    TorrentEvent::Download { path, bytes } => {
                        tracing::info!("downloaded {} ({bytes} bytes)", path.display())
                    }
                    TorrentEvent::Done => {
                        println!("Finished sync, seeding");
                        break;
                    }
                    TorrentEvent::Failed { reason } => anyhow::bail!("transfer failed: {reason}"),
                }
            }
            Ok::<_, anyhow::Error>(())
        })?
    }
}
