//! bt-mut: keep a folder in sync with a mutable torrent.
//!
//! # Usage
//!
//! ```text
//! bt-mut sync [MAGNET] [-p PATH]
//! bt-mut push [-p PATH] [--seed HEX | --public-key HEX --secret-key HEX]
//! bt-mut pull [MAGNET] [-p PATH]
//! bt-mut status [-p PATH] [--json]
//! ```
//!
//! Global: `--secret-storage DIR` (key vault), `--store DIR` (local engine).

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::{pull::PullArgs, push::PushArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "bt-mut",
    version,
    about = "Sync your folder with a mutable torrent",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Storage locations shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Where secret keys are stored. Defaults to the user config folder.
    #[arg(long, global = true, value_name = "DIR")]
    pub secret_storage: Option<PathBuf>,

    /// Root of the local torrent store. Defaults to the user data folder.
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish, update or follow the torrent for a folder, whichever applies.
    Sync(SyncArgs),

    /// Publish the folder's current contents to its mutable torrent.
    Push(PushArgs),

    /// Download a torrent (or the folder's tracked one) into the folder.
    Pull(PullArgs),

    /// Show what the folder is tracking.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(&cli.globals),
        Commands::Push(args) => args.run(&cli.globals),
        Commands::Pull(args) => args.run(&cli.globals),
        Commands::Status(args) => args.run(&cli.globals),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
