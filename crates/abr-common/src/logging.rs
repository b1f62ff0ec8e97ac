//! Logging setup shared by the CLI and library consumers.
//!
//! Structured `tracing` output to console, a daily-rotating file, or
//! both. Call [`init_logging`] once at process start; components only
//! use the `tracing` macros.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Output target for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            _ => Err(anyhow::anyhow!("invalid log output: {}", s)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// EnvFilter directive string, e.g. "info" or "abr_ingest=debug,sqlx=warn"
    pub filter: String,
    pub output: LogOutput,
    pub log_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            output: LogOutput::Console,
            log_dir: PathBuf::from("./logs"),
            file_prefix: "abrdb".to_string(),
        }
    }
}

impl LogConfig {
    /// Load from `ABRDB_LOG_FILTER`, `ABRDB_LOG_OUTPUT` and
    /// `ABRDB_LOG_DIR`, falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var("ABRDB_LOG_FILTER") {
            config.filter = filter;
        }
        if let Ok(output) = std::env::var("ABRDB_LOG_OUTPUT") {
            if let Ok(parsed) = output.parse() {
                config.output = parsed;
            }
        }
        if let Ok(dir) = std::env::var("ABRDB_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        config
    }
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).context("invalid log filter directive")?;

    match config.output {
        LogOutput::Console => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
        LogOutput::File => {
            let file_layer = file_layer(config)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .try_init()?;
        }
        LogOutput::Both => {
            let file_layer = file_layer(config)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()?;
        }
    }

    Ok(())
}

fn file_layer<S>(config: &LogConfig) -> Result<impl tracing_subscriber::Layer<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.log_dir).context("failed to create log directory")?;

    let appender = tracing_appender::rolling::daily(&config.log_dir, &config.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    // The guard must outlive the process for buffered lines to flush.
    std::mem::forget(guard);

    Ok(fmt::layer().with_writer(non_blocking).with_ansi(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("console".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("FILE".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert_eq!("both".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert!("invalid".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_default_filter() {
        let config = LogConfig::default();
        assert_eq!(config.filter, "info");
        assert_eq!(config.output, LogOutput::Console);
    }
}
