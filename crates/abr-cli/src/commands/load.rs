//! `abrdb load-portability` / `abrdb load-numbering-plan`

use std::path::Path;

use anyhow::Context;

use abr_common::{config::DatabaseConfig, db::create_pool};
use abr_ingest::{Ingestor, LoadMode, LoadOptions, RecordFamily};

pub async fn run(
    family: RecordFamily,
    input: &Path,
    truncate: bool,
    rebuild_database: bool,
    rebuild_indexes: bool,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    let config = DatabaseConfig::from_env().context("failed to load database configuration")?;
    let pool = create_pool(&config).await?;

    let ingestor = match batch_size {
        Some(size) => Ingestor::with_batch_size(&pool, size),
        None => Ingestor::new(&pool),
    };
    let options = LoadOptions {
        mode: if truncate {
            LoadMode::Truncate
        } else {
            LoadMode::Append
        },
        rebuild_database,
        rebuild_indexes,
    };

    let summary = match family {
        RecordFamily::Portability => ingestor.load_portability(input, &options).await?,
        RecordFamily::NumberingPlan => ingestor.load_numbering_plan(input, &options).await?,
    };

    println!(
        "Imported {} file(s): {} rows loaded, {} rejected",
        summary.files_processed, summary.rows_imported, summary.rows_rejected
    );
    if !summary.files_failed.is_empty() {
        eprintln!("Failed files:");
        for failure in &summary.files_failed {
            eprintln!(
                "  {} [{}]: {}",
                failure.file.display(),
                failure.kind,
                failure.message
            );
        }
        anyhow::bail!(
            "{} of {} file(s) failed to import",
            summary.files_failed.len(),
            summary.files_processed + summary.files_failed.len()
        );
    }
    Ok(())
}
