//! Error taxonomy for ingestion and resolution.
//!
//! Decode-level problems are absorbed and aggregated by the caller
//! ([`DecodeError`] is not a member of [`AbrError`]); everything else
//! propagates as a typed failure with enough context (file name, batch
//! index, underlying database error text) to reproduce it.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ABR database operations
pub type Result<T> = std::result::Result<T, AbrError>;

/// Fatal error kinds for ingestion and resolution operations
#[derive(Error, Debug)]
pub enum AbrError {
    /// Input path does not exist or contains no matching files.
    /// Raised before any database operation.
    #[error("input not found: '{path}' does not exist or contains no {expected} files")]
    InputNotFound { path: PathBuf, expected: &'static str },

    /// A file's record kind cannot be inferred from its name.
    /// Fatal for that file only; a directory batch continues.
    #[error("cannot determine record kind for file '{file}'")]
    Classification { file: String },

    /// A batch insert failed. Fatal for the current file; connection-loss
    /// variants are fatal for the whole run.
    #[error("bulk load failed for '{file}' (batch {batch}): {source}")]
    BulkLoad {
        file: String,
        batch: usize,
        #[source]
        source: sqlx::Error,
    },

    /// DDL or set-based merge statement failure. Fatal for the current
    /// operation; table/index (re)creation failures are fatal for the run.
    #[error("schema operation '{operation}' failed: {source}")]
    Schema {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Cannot reach or authenticate to the database.
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unparseable reference date or malformed number batch. Fatal for
    /// the whole resolution call; no partial results are returned.
    #[error("invalid input: {0}")]
    InputFormat(String),

    /// Overlapping numbering-plan ranges for the same (cn, prefix).
    /// Surfaced at import time instead of silently picking a match.
    #[error("numbering range conflict in '{file}': {count} overlapping rows")]
    RangeOverlap { file: String, count: i64 },

    /// Filesystem failure while reading a source file.
    #[error("I/O error on '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl AbrError {
    /// Short stable name of the error kind, used in import summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            AbrError::InputNotFound { .. } => "input-not-found",
            AbrError::Classification { .. } => "classification",
            AbrError::BulkLoad { .. } => "bulk-load",
            AbrError::Schema { .. } => "schema",
            AbrError::Connection(_) => "connection",
            AbrError::Config(_) => "config",
            AbrError::InputFormat(_) => "input-format",
            AbrError::RangeOverlap { .. } => "range-overlap",
            AbrError::Io { .. } => "io",
        }
    }

    /// Whether this error means the database session is gone. A run-level
    /// abort: remaining files in a directory batch are not attempted.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            AbrError::Connection(_) => true,
            AbrError::BulkLoad { source, .. } | AbrError::Schema { source, .. } => {
                is_connection_error(source)
            }
            _ => false,
        }
    }
}

/// Classify an sqlx error as session loss rather than a statement failure.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// A row that failed type coercion during decoding.
///
/// Recorded and skipped; the decode stream continues. The orchestrator
/// decides whether the aggregate count is tolerable.
#[derive(Debug, Clone)]
pub struct DecodeError {
    /// Source file the row came from
    pub file: String,
    /// 1-based line number within the delimited payload
    pub line: u64,
    /// Record kind being decoded (e.g. "portability", "stfc")
    pub kind: &'static str,
    /// What failed to coerce
    pub reason: String,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} [{}]: {}",
            self.file, self.line, self.kind, self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        let err = AbrError::Classification {
            file: "UNKNOWN_2024.zip".to_string(),
        };
        assert_eq!(err.kind(), "classification");

        let err = AbrError::InputFormat("bad date".to_string());
        assert_eq!(err.kind(), "input-format");
    }

    #[test]
    fn test_connection_loss_detection() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        let err = AbrError::BulkLoad {
            file: "a.csv.gz".to_string(),
            batch: 3,
            source: io,
        };
        assert!(err.is_connection_loss());

        let err = AbrError::BulkLoad {
            file: "a.csv.gz".to_string(),
            batch: 3,
            source: sqlx::Error::RowNotFound,
        };
        assert!(!err.is_connection_loss());
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError {
            file: "PIP_01.csv.gz".to_string(),
            line: 42,
            kind: "portability",
            reason: "invalid tn_inicial: 'abc'".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("PIP_01.csv.gz:42"));
        assert!(rendered.contains("portability"));
    }
}
