//! Shared foundation for the ABR telecom database tools.
//!
//! Holds what every other crate needs: the error taxonomy for ingestion
//! and resolution, database configuration and pool construction, and
//! logging setup.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use config::DatabaseConfig;
pub use error::{AbrError, DecodeError, Result};
