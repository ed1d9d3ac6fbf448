use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tabula - schema management and snapshots for a SQLite database
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version)]
#[command(about = "Inspect and maintain a Tabula database", long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults apply when the file is missing)
    #[arg(short = 'c', long = "config", default_value = "tabula.toml")]
    pub config: PathBuf,

    /// Override storage.data_path
    #[arg(long = "data-path")]
    pub data_path: Option<String>,

    /// Caller recorded as the author of manual snapshots
    #[arg(long = "as", default_value = "admin")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every table with its policy and cached row count
    Tables,
    /// Show the columns of a table
    Columns { table: String },
    /// Manage schema snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
    /// Run a single read-only SELECT
    Sql { query: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCommand {
    /// Capture the current user schema
    Create {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List snapshots, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u64,
    },
    Show { id: String },
    /// Replace the live user schema with a snapshot (drops table data)
    Restore {
        id: String,
        /// Required: restore is destructive
        #[arg(long)]
        yes: bool,
    },
    Delete { id: String },
    /// Compare two snapshots
    Diff { from: String, to: String },
}
