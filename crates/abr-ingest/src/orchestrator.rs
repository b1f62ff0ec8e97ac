//! Ingestion orchestration.
//!
//! One [`Ingestor`] run takes an input path (single export or a
//! directory of them), drives every file through the
//! Pending → Classifying → Loading → Promoting → Done|Failed state
//! machine on a single pooled connection, and aggregates the outcome
//! into an [`ImportSummary`].
//!
//! A failed file does not stop a directory batch; a lost database
//! session does, since every remaining file would fail the same way.

use std::path::{Path, PathBuf};
use std::time::Instant;

use sqlx::postgres::{PgConnection, PgPool};
use walkdir::WalkDir;

use abr_common::{AbrError, Result};

use crate::decode;
use crate::kind::{NumberingKind, RecordFamily, RecordKind};
use crate::loader::{BulkLoader, LoadStats};
use crate::models::{CngRow, NumberingRow, PortabilityRow, SupRow};
use crate::promote;
use crate::schema;

/// What to do with already-promoted data before this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Empty the family's target tables first; the run's exports become
    /// the entire dataset.
    Truncate,
    /// Merge into existing data (the default).
    #[default]
    Append,
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub mode: LoadMode,
    /// Drop and recreate every target table before loading.
    pub rebuild_database: bool,
    /// Drop and recreate target indexes after loading.
    pub rebuild_indexes: bool,
}

/// One file that could not be imported.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub file: PathBuf,
    /// Stable error-kind name, see [`AbrError::kind`].
    pub kind: &'static str,
    pub message: String,
}

/// Aggregated outcome of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub files_processed: usize,
    pub files_failed: Vec<FileFailure>,
    pub rows_imported: u64,
    pub rows_rejected: u64,
}

impl ImportSummary {
    pub fn all_succeeded(&self) -> bool {
        self.files_failed.is_empty()
    }
}

/// Lifecycle of a single file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Pending,
    Classifying,
    Loading,
    Promoting,
    Done,
    Failed,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileState::Pending => "pending",
            FileState::Classifying => "classifying",
            FileState::Loading => "loading",
            FileState::Promoting => "promoting",
            FileState::Done => "done",
            FileState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(file: &str, from: FileState, to: FileState) -> FileState {
    tracing::debug!(file, %from, %to, "state transition");
    to
}

/// Drives ingestion runs against one database pool.
pub struct Ingestor<'a> {
    pool: &'a PgPool,
    loader: BulkLoader,
}

impl<'a> Ingestor<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            loader: BulkLoader::default(),
        }
    }

    pub fn with_batch_size(pool: &'a PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            loader: BulkLoader::new(batch_size),
        }
    }

    /// Import PIP portability reports from `input` (a `.csv.gz` file or
    /// a directory of them).
    pub async fn load_portability(
        &self,
        input: &Path,
        options: &LoadOptions,
    ) -> Result<ImportSummary> {
        self.run(input, RecordFamily::Portability, options).await
    }

    /// Import NSAPN numbering-plan exports from `input` (a `.zip` file
    /// or a directory of them).
    pub async fn load_numbering_plan(
        &self,
        input: &Path,
        options: &LoadOptions,
    ) -> Result<ImportSummary> {
        self.run(input, RecordFamily::NumberingPlan, options).await
    }

    async fn run(
        &self,
        input: &Path,
        family: RecordFamily,
        options: &LoadOptions,
    ) -> Result<ImportSummary> {
        let started = Instant::now();
        let files = discover_files(input, family)?;
        tracing::info!(
            input = %input.display(),
            files = files.len(),
            ?family,
            "starting ingestion run"
        );

        // One connection for the whole run keeps staging truncation,
        // loads and promotions on the same session.
        let mut conn = self.pool.acquire().await.map_err(AbrError::Connection)?;
        let conn = &mut *conn;

        schema::ensure_schemas(conn).await?;
        schema::ensure_staging_tables(conn).await?;
        if options.rebuild_database {
            schema::rebuild_target_tables(conn).await?;
        } else {
            schema::ensure_target_tables(conn).await?;
        }
        if options.mode == LoadMode::Truncate && !options.rebuild_database {
            schema::truncate_target_tables(conn, family).await?;
        }
        truncate_staging_for(conn, family).await?;

        let mut summary = ImportSummary::default();
        for path in &files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());

            match self.process_file(conn, path, &file_name, family).await {
                Ok(stats) => {
                    summary.files_processed += 1;
                    summary.rows_imported += stats.rows_loaded;
                    summary.rows_rejected += stats.rows_rejected;
                }
                Err(err) if err.is_connection_loss() => {
                    tracing::error!(file = %file_name, error = %err, "database session lost, aborting run");
                    return Err(err);
                }
                Err(err) => {
                    tracing::debug!(file = %file_name, to = %FileState::Failed, "state transition");
                    tracing::error!(file = %file_name, error = %err, "file import failed");
                    summary.files_failed.push(FileFailure {
                        file: path.clone(),
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        promote::refresh_carriers(conn).await?;
        if options.rebuild_indexes {
            schema::rebuild_indexes(conn).await?;
        }

        tracing::info!(
            files_processed = summary.files_processed,
            files_failed = summary.files_failed.len(),
            rows_imported = summary.rows_imported,
            rows_rejected = summary.rows_rejected,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "ingestion run finished"
        );
        Ok(summary)
    }

    async fn process_file(
        &self,
        conn: &mut PgConnection,
        path: &Path,
        file_name: &str,
        family: RecordFamily,
    ) -> Result<LoadStats> {
        let started = Instant::now();
        let mut state = FileState::Pending;

        state = transition(file_name, state, FileState::Classifying);
        let kind = match family {
            RecordFamily::Portability => RecordKind::Portability,
            RecordFamily::NumberingPlan => RecordKind::Numbering(NumberingKind::classify(path)?),
        };

        state = transition(file_name, state, FileState::Loading);
        let stats = self.load_into_staging(conn, path, file_name, kind).await?;

        state = transition(file_name, state, FileState::Promoting);
        match kind {
            RecordKind::Portability => {
                promote::promote_portability(conn, file_name).await?;
            }
            RecordKind::Numbering(NumberingKind::Cng) => {
                promote::promote_cng(conn, file_name).await?;
            }
            RecordKind::Numbering(NumberingKind::Sup) => {
                promote::promote_sup(conn, file_name).await?;
            }
            RecordKind::Numbering(_) => {
                promote::check_range_overlap(conn, file_name).await?;
                promote::promote_numbering(conn, file_name).await?;
            }
        }

        transition(file_name, state, FileState::Done);
        tracing::info!(
            file = file_name,
            kind = kind.name(),
            rows_loaded = stats.rows_loaded,
            rows_rejected = stats.rows_rejected,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "file imported"
        );
        Ok(stats)
    }

    async fn load_into_staging(
        &self,
        conn: &mut PgConnection,
        path: &Path,
        file_name: &str,
        kind: RecordKind,
    ) -> Result<LoadStats> {
        let copy = schema::copy_statement(kind);
        let source = file_name.to_string();

        match kind {
            RecordKind::Portability => {
                let reader = decode::open_gzip(path)?;
                let rows = decode::rows(reader, source.clone(), kind.name(), move |rec| {
                    PortabilityRow::from_record(rec, &source)
                });
                self.loader.load(conn, copy, rows, file_name).await
            }
            RecordKind::Numbering(NumberingKind::Cng) => {
                let reader = decode::open_zip_entry(path)?;
                let rows = decode::rows(reader, source.clone(), kind.name(), move |rec| {
                    CngRow::from_record(rec, &source)
                });
                self.loader.load(conn, copy, rows, file_name).await
            }
            RecordKind::Numbering(NumberingKind::Sup) => {
                let reader = decode::open_zip_entry(path)?;
                let rows = decode::rows(reader, source.clone(), kind.name(), move |rec| {
                    SupRow::from_record(rec, &source)
                });
                self.loader.load(conn, copy, rows, file_name).await
            }
            RecordKind::Numbering(ranged) => {
                let reader = decode::open_zip_entry(path)?;
                let rows = decode::rows(reader, source.clone(), kind.name(), move |rec| {
                    NumberingRow::from_record(rec, ranged, &source)
                });
                self.loader.load(conn, copy, rows, file_name).await
            }
        }
    }
}

async fn truncate_staging_for(conn: &mut PgConnection, family: RecordFamily) -> Result<()> {
    match family {
        RecordFamily::Portability => {
            schema::truncate_staging(conn, RecordKind::Portability).await
        }
        RecordFamily::NumberingPlan => {
            schema::truncate_staging(conn, RecordKind::Numbering(NumberingKind::Smp)).await?;
            schema::truncate_staging(conn, RecordKind::Numbering(NumberingKind::Cng)).await?;
            schema::truncate_staging(conn, RecordKind::Numbering(NumberingKind::Sup)).await
        }
    }
}

/// Resolve `input` to the sorted list of files to import.
///
/// A file path is accepted as-is; a directory is scanned recursively
/// for names ending in the family's extension. Fails before any
/// database work when nothing matches.
fn discover_files(input: &Path, family: RecordFamily) -> Result<Vec<PathBuf>> {
    let extension = family.extension();
    let not_found = || AbrError::InputNotFound {
        path: input.to_path_buf(),
        expected: extension,
    };

    if !input.exists() {
        return Err(not_found());
    }
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().ends_with(extension))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(not_found());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_missing_path_is_input_not_found() {
        let err = discover_files(Path::new("/nonexistent/dir"), RecordFamily::Portability)
            .unwrap_err();
        assert_eq!(err.kind(), "input-not-found");
    }

    #[test]
    fn test_discover_single_file_accepted_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PIP_20240101.csv.gz");
        std::fs::write(&path, b"x").unwrap();

        let files = discover_files(&path, RecordFamily::Portability).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn test_discover_directory_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv.gz", "a.csv.gz", "notes.txt", "SMP_2024.zip"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.csv.gz"), b"x").unwrap();

        let files = discover_files(dir.path(), RecordFamily::Portability).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv.gz", "b.csv.gz", "c.csv.gz"]);

        let zips = discover_files(dir.path(), RecordFamily::NumberingPlan).unwrap();
        assert_eq!(zips.len(), 1);
    }

    #[test]
    fn test_discover_empty_directory_is_input_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), b"x").unwrap();

        let err = discover_files(dir.path(), RecordFamily::NumberingPlan).unwrap_err();
        assert_eq!(err.kind(), "input-not-found");
    }

    #[test]
    fn test_summary_success_flag() {
        let mut summary = ImportSummary::default();
        assert!(summary.all_succeeded());

        summary.files_failed.push(FileFailure {
            file: PathBuf::from("UNKNOWN.zip"),
            kind: "classification",
            message: "cannot determine record kind".to_string(),
        });
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_file_state_display() {
        assert_eq!(FileState::Pending.to_string(), "pending");
        assert_eq!(FileState::Done.to_string(), "done");
        assert_eq!(FileState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_default_options_append_without_rebuild() {
        let options = LoadOptions::default();
        assert_eq!(options.mode, LoadMode::Append);
        assert!(!options.rebuild_database);
        assert!(!options.rebuild_indexes);
    }
}
