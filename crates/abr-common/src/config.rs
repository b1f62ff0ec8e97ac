//! Database configuration.
//!
//! One explicit [`DatabaseConfig`] is constructed at process start (from
//! environment variables, with `.env` support) and passed by reference
//! into every component. Components never read the environment
//! themselves.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;

use crate::error::{AbrError, Result};

/// Default PostgreSQL port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default maximum pool size. Ingestion and resolution each hold a
/// single connection for the duration of an operation, so the pool
/// stays small.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Connection settings for the relational store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub connect_timeout_secs: u64,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file if present, then requires `ABRDB_HOST`,
    /// `ABRDB_NAME`, `ABRDB_USER` and `ABRDB_PASSWORD`. Optional:
    /// `ABRDB_PORT`, `ABRDB_CONNECT_TIMEOUT`, `ABRDB_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let required = ["ABRDB_HOST", "ABRDB_NAME", "ABRDB_USER", "ABRDB_PASSWORD"];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|var| std::env::var(var).map(|v| v.is_empty()).unwrap_or(true))
            .collect();

        if !missing.is_empty() {
            return Err(AbrError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let config = Self {
            host: std::env::var("ABRDB_HOST").unwrap_or_default(),
            port: std::env::var("ABRDB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_PORT),
            database: std::env::var("ABRDB_NAME").unwrap_or_default(),
            user: std::env::var("ABRDB_USER").unwrap_or_default(),
            password: std::env::var("ABRDB_PASSWORD").unwrap_or_default(),
            connect_timeout_secs: std::env::var("ABRDB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_connections: std::env::var("ABRDB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration well-formedness without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(AbrError::Config("database host cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(AbrError::Config("database port must be non-zero".into()));
        }
        if self.database.is_empty() {
            return Err(AbrError::Config("database name cannot be empty".into()));
        }
        if self.user.is_empty() {
            return Err(AbrError::Config("database user cannot be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(AbrError::Config("max_connections must be non-zero".into()));
        }
        Ok(())
    }

    /// Build typed connect options. Avoids URL assembly so credentials
    /// never need percent-encoding.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_DB_PORT,
            database: "abrdb".to_string(),
            user: "abrdb".to_string(),
            password: String::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = DatabaseConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let config = DatabaseConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DatabaseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_connect_options_carry_database() {
        let config = DatabaseConfig::default();
        let opts = config.connect_options();
        // PgConnectOptions exposes the database via get_database()
        assert_eq!(opts.get_database(), Some("abrdb"));
    }
}
