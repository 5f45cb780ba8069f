use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, global = true, env = "SONGBOOK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Log more (`-v` for debug, `-vv` for trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bring the index in line with the library on disk
    Sync {
        /// Library root, instead of `library.root` from the configuration
        #[arg(long)]
        root: Option<PathBuf>,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a snapshot of the database into the backup directory
    Snapshot,
    /// Replace the database with a snapshot
    Restore { path: PathBuf },
    /// List snapshots in the backup directory, newest first
    Snapshots,
    /// Run the database integrity check
    Check,
    /// Show index and enrichment progress
    Status,
    /// Put every automatically labelled entry back in the enrichment queue
    Requeue,
}
