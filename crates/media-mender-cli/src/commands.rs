use clap::{Args, Parser, Subcommand};
use media_mender_core::{RepairStatus, TypeFilter};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "media-mender")]
#[command(about = "Verify, repair, back up and deduplicate media files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags shared by every command that walks a media tree.
#[derive(Debug, Args)]
pub struct TreeArgs {
    /// Root directory to scan (overrides root_path)
    #[arg(short, long)]
    pub path: Option<String>,
    /// Which media types to process: images, videos or both
    #[arg(short, long)]
    pub types: Option<TypeFilter>,
    /// Delete duplicates without asking
    #[arg(short, long)]
    pub yes: bool,
    /// Audit database file (overrides db_path)
    #[arg(long)]
    pub db: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify and repair every media file under the root
    Repair {
        #[command(flatten)]
        tree: TreeArgs,
        /// Do not write .bak copies before repairing
        #[arg(long)]
        no_backup: bool,
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Look for byte-identical duplicates after the repair pass
        #[arg(long)]
        dedupe: bool,
    },
    /// Find and delete byte-identical duplicates only
    Dedupe {
        #[command(flatten)]
        tree: TreeArgs,
    },
    /// List audit log rows, optionally exporting them as CSV
    Report {
        /// Only rows with this status (valid, repaired, corrupt, skipped)
        #[arg(short, long)]
        status: Option<RepairStatus>,
        /// Maximum number of rows
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
        /// Write the rows to this CSV file instead of the terminal
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        db: Option<String>,
    },
    /// Print configuration values
    PrintConfig,
    /// Delete every row of the audit log
    TruncateDb {
        #[arg(long)]
        db: Option<String>,
    },
}
