//! ABR registry database CLI.
//!
//! Subcommands:
//!
//! - **Ingestion**: import PIP portability reports
//!   (`abrdb load-portability`) and NSAPN numbering-plan exports
//!   (`abrdb load-numbering-plan`) into PostgreSQL
//! - **Resolution**: resolve the serving carrier for a batch of
//!   terminal numbers at a reference date (`abrdb resolve`)
//! - **Diagnostics**: check configuration, reachability and
//!   authentication independently (`abrdb test-connection`)

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ABR Telecom registry ingestion and carrier resolution
#[derive(Parser, Debug)]
#[command(name = "abrdb")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (debug-level logging to the console)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import PIP portability reports (.csv.gz file or directory)
    LoadPortability {
        /// Report file or directory of reports
        input: PathBuf,

        /// Empty the portability history before importing
        #[arg(long)]
        truncate: bool,

        /// Drop and recreate every target table first
        #[arg(long)]
        rebuild_database: bool,

        /// Drop and recreate target indexes after the import
        #[arg(long)]
        rebuild_indexes: bool,

        /// Rows per COPY batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Import NSAPN numbering-plan exports (.zip file or directory)
    LoadNumberingPlan {
        /// Export file or directory of exports
        input: PathBuf,

        /// Empty the numbering tables before importing
        #[arg(long)]
        truncate: bool,

        /// Drop and recreate every target table first
        #[arg(long)]
        rebuild_database: bool,

        /// Drop and recreate target indexes after the import
        #[arg(long)]
        rebuild_indexes: bool,

        /// Rows per COPY batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Resolve the serving carrier for a batch of terminal numbers
    Resolve {
        /// Terminal numbers (digits only)
        numbers: Vec<String>,

        /// Reference date (YYYY-MM-DD, DD/MM/YYYY or YYYYMMDD);
        /// defaults to today
        #[arg(short, long)]
        date: Option<String>,

        /// Read additional numbers from a file, one per line
        #[arg(long)]
        input: Option<PathBuf>,

        /// Emit JSON instead of delimited text
        #[arg(long)]
        json: bool,
    },

    /// Check database configuration, reachability and authentication
    TestConnection,
}
