//! Chunked COPY loader.
//!
//! Rows are buffered and shipped to a staging table in fixed-size
//! batches over the COPY protocol, so memory stays bounded no matter
//! how large the export is. Per-row decode failures are counted and
//! skipped; stream-level and database failures abort the file.

use sqlx::postgres::PgConnection;

use abr_common::{AbrError, Result};

use crate::decode::DecodeFailure;
use crate::models::StagingRow;

/// Rows per COPY batch. Matches the chunk size the registry exports
/// are comfortably ingested with while keeping each batch's buffer in
/// the tens of megabytes.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Outcome counters for one file's load into staging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub batches: u32,
}

/// Batch-oriented COPY writer.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoader {
    batch_size: usize,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BulkLoader {
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self { batch_size }
    }

    /// Drain `rows` into the staging table addressed by
    /// `copy_statement`, one COPY per full batch plus a final partial
    /// one. `file` is used for error context and logging only.
    ///
    /// Rows that failed coercion are counted in `rows_rejected` and
    /// skipped. A stream-level failure means the remainder of the
    /// source is unreadable, so the load errors out instead of
    /// presenting a partial file as complete.
    pub async fn load<T, I>(
        &self,
        conn: &mut PgConnection,
        copy_statement: &str,
        rows: I,
        file: &str,
    ) -> Result<LoadStats>
    where
        T: StagingRow,
        I: Iterator<Item = std::result::Result<T, DecodeFailure>>,
    {
        let mut stats = LoadStats::default();
        let mut buffer = String::new();
        let mut buffered: usize = 0;

        for item in rows {
            match item {
                Ok(row) => {
                    row.write_copy_row(&mut buffer);
                    buffered += 1;
                    if buffered >= self.batch_size {
                        self.flush(conn, copy_statement, &mut buffer, buffered, &mut stats, file)
                            .await?;
                        buffered = 0;
                    }
                }
                Err(DecodeFailure::Row(decode_err)) => {
                    stats.rows_rejected += 1;
                    tracing::warn!(error = %decode_err, "rejected row");
                }
                Err(DecodeFailure::Stream(err)) => {
                    tracing::error!(
                        file,
                        rows_loaded = stats.rows_loaded,
                        error = %err,
                        "source stream failed mid-load"
                    );
                    return Err(err);
                }
            }
        }

        if buffered > 0 {
            self.flush(conn, copy_statement, &mut buffer, buffered, &mut stats, file)
                .await?;
        }

        tracing::info!(
            file,
            rows_loaded = stats.rows_loaded,
            rows_rejected = stats.rows_rejected,
            batches = stats.batches,
            "staging load complete"
        );
        Ok(stats)
    }

    async fn flush(
        &self,
        conn: &mut PgConnection,
        copy_statement: &str,
        buffer: &mut String,
        row_count: usize,
        stats: &mut LoadStats,
        file: &str,
    ) -> Result<()> {
        let batch_index = stats.batches as usize + 1;
        let bulk_err = |source: sqlx::Error| AbrError::BulkLoad {
            file: file.to_string(),
            batch: batch_index,
            source,
        };

        let mut copy = conn.copy_in_raw(copy_statement).await.map_err(bulk_err)?;
        if let Err(send_err) = copy.send(buffer.as_bytes()).await {
            // Best effort: tell the server the COPY is dead so the
            // connection can be reused for the next statement.
            let _ = copy.abort("client-side send failure").await;
            return Err(bulk_err(send_err));
        }
        copy.finish().await.map_err(bulk_err)?;

        stats.rows_loaded += row_count as u64;
        stats.batches += 1;
        tracing::debug!(
            file,
            batch = batch_index,
            rows = row_count,
            bytes = buffer.len(),
            "copied batch to staging"
        );
        buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_size() {
        assert_eq!(BulkLoader::default().batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(BulkLoader::new(500).batch_size, 500);
    }

    #[test]
    #[should_panic(expected = "batch size must be positive")]
    fn test_zero_batch_size_panics() {
        BulkLoader::new(0);
    }

    #[test]
    fn test_load_stats_default() {
        let stats = LoadStats::default();
        assert_eq!(stats.rows_loaded, 0);
        assert_eq!(stats.rows_rejected, 0);
        assert_eq!(stats.batches, 0);
    }
}
