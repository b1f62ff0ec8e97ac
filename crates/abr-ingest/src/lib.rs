//! Bulk ingestion pipeline for ABR Telecom registry exports.
//!
//! Two source families are supported:
//!
//! - **Portability** (`*.csv.gz`): completed-portability-ticket reports
//!   from the PIP system, one record kind.
//! - **Numbering plan** (`*.zip`): public NSAPN designation exports in
//!   six subtypes (STFC, STFC-FATB, SMP, SME, CNG, SUP), inferred from
//!   the filename.
//!
//! Data flow: files → [`decode`] → [`loader`] (chunked COPY into
//! staging) → [`promote`] (set-based merge into target tables). The
//! [`orchestrator`] drives the whole thing file by file and aggregates
//! an [`orchestrator::ImportSummary`].

pub mod decode;
pub mod kind;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod promote;
pub mod schema;

pub use kind::{NumberingKind, RecordFamily, RecordKind};
pub use orchestrator::{FileFailure, ImportSummary, Ingestor, LoadMode, LoadOptions};
