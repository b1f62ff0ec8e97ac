//! Connection diagnostics.
//!
//! Three independent checks so an operator can tell a typo in the
//! config apart from a firewall problem or a bad password:
//! configuration well-formedness, server reachability, and
//! authentication. The function never fails; problems are reported in
//! the returned struct.

use std::time::Duration;

use serde::Serialize;
use sqlx::postgres::PgConnection;
use sqlx::Connection;

use abr_common::DatabaseConfig;

/// Outcome of [`test_connection`]. Later checks are skipped (and left
/// `false`) when an earlier one fails, except that an authentication
/// failure still proves the server was reachable.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionDiagnostics {
    pub config_valid: bool,
    pub reachable: bool,
    pub authenticated: bool,
    /// Human-readable detail for the first failed check, if any.
    pub detail: Option<String>,
}

impl ConnectionDiagnostics {
    pub fn all_passed(&self) -> bool {
        self.config_valid && self.reachable && self.authenticated
    }
}

/// SQLSTATE class 28 covers invalid authorization (bad password,
/// unknown role, pg_hba rejection).
fn is_auth_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("28"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Probe the database described by `config`.
pub async fn test_connection(config: &DatabaseConfig) -> ConnectionDiagnostics {
    let mut report = ConnectionDiagnostics {
        config_valid: false,
        reachable: false,
        authenticated: false,
        detail: None,
    };

    if let Err(err) = config.validate() {
        report.detail = Some(err.to_string());
        return report;
    }
    report.config_valid = true;

    let options = config.connect_options();
    let timeout = Duration::from_secs(config.connect_timeout_secs);

    match tokio::time::timeout(timeout, PgConnection::connect_with(&options)).await {
        Err(_) => {
            report.detail = Some(format!(
                "server unreachable: connect timed out after {}s",
                config.connect_timeout_secs
            ));
        }
        Ok(Ok(mut conn)) => {
            report.reachable = true;
            report.authenticated = true;
            // A round trip proves the session actually works.
            if let Err(err) = sqlx::query("SELECT 1").execute(&mut conn).await {
                report.authenticated = false;
                report.detail = Some(format!("session check failed: {err}"));
            }
            let _ = conn.close().await;
        }
        Ok(Err(err)) if is_auth_failure(&err) => {
            report.reachable = true;
            report.detail = Some(format!("authentication failed: {err}"));
        }
        Ok(Err(err)) => {
            report.detail = Some(format!("server unreachable: {err}"));
        }
    }

    tracing::info!(
        config_valid = report.config_valid,
        reachable = report.reachable,
        authenticated = report.authenticated,
        "connection diagnostics"
    );
    report
}

/// Load configuration from the environment and check it. A config that
/// cannot even be loaded counts as the first check failing.
pub async fn test_connection_from_env() -> ConnectionDiagnostics {
    match DatabaseConfig::from_env() {
        Ok(config) => test_connection(&config).await,
        Err(err) => ConnectionDiagnostics {
            config_valid: false,
            reachable: false,
            authenticated: false,
            detail: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_config_short_circuits() {
        let config = DatabaseConfig {
            host: String::new(),
            ..Default::default()
        };
        let report = test_connection(&config).await;
        assert!(!report.config_valid);
        assert!(!report.reachable);
        assert!(!report.authenticated);
        assert!(report.detail.is_some());
        assert!(!report.all_passed());
    }

    #[tokio::test]
    async fn test_unreachable_host_reported() {
        let config = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            // Reserved port nothing listens on in the test environment.
            port: 1,
            connect_timeout_secs: 1,
            ..Default::default()
        };
        let report = test_connection(&config).await;
        assert!(report.config_valid);
        assert!(!report.reachable);
        assert!(!report.authenticated);
        assert!(report.detail.unwrap().contains("unreachable"));
    }

    #[test]
    fn test_all_passed() {
        let report = ConnectionDiagnostics {
            config_valid: true,
            reachable: true,
            authenticated: true,
            detail: None,
        };
        assert!(report.all_passed());
    }
}
