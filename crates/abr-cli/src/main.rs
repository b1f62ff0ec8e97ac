//! ABR registry CLI - main entry point

use std::process;

use abr_cli::{Cli, Commands};
use abr_common::logging::{init_logging, LogConfig};
use abr_ingest::RecordFamily;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Environment settings win; --verbose only raises the default.
    let mut log_config = LogConfig::from_env();
    if cli.verbose && std::env::var("ABRDB_LOG_FILTER").is_err() {
        log_config.filter = "debug".to_string();
    }
    // The CLI still works if logging cannot be set up.
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::LoadPortability {
            input,
            truncate,
            rebuild_database,
            rebuild_indexes,
            batch_size,
        } => {
            abr_cli::commands::load::run(
                RecordFamily::Portability,
                input,
                *truncate,
                *rebuild_database,
                *rebuild_indexes,
                *batch_size,
            )
            .await
        }

        Commands::LoadNumberingPlan {
            input,
            truncate,
            rebuild_database,
            rebuild_indexes,
            batch_size,
        } => {
            abr_cli::commands::load::run(
                RecordFamily::NumberingPlan,
                input,
                *truncate,
                *rebuild_database,
                *rebuild_indexes,
                *batch_size,
            )
            .await
        }

        Commands::Resolve {
            numbers,
            date,
            input,
            json,
        } => {
            abr_cli::commands::resolve::run(numbers, date.as_deref(), input.as_deref(), *json).await
        }

        Commands::TestConnection => abr_cli::commands::test_connection::run().await,
    }
}
