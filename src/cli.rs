use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scribeforge")]
#[command(author, version, about = "Content-addressed media-to-text pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the pipeline daemon (workers, reconciliation, inbox watcher)
    Start,

    /// Ingest files, run them through the pipeline and wait for the result
    Process {
        /// Media files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Restart from the first stage even if already processed
        #[arg(long)]
        reprocess: bool,

        /// Output the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the status of a fingerprint
    Status {
        /// Content fingerprint
        fingerprint: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List ledger records, most recently updated first
    List {
        /// Only show records with this status (in_progress, succeeded, failed)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the stage outputs of a fingerprint
    Outputs {
        /// Content fingerprint
        fingerprint: String,
    },

    /// Ledger database maintenance
    Db {
        #[command(subcommand)]
        action: DbCommand,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Create the ledger database and run migrations
    Init,

    /// Show record counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all records, keeping the schema
    Clear,

    /// Delete the database file and recreate it
    Reset,
}
