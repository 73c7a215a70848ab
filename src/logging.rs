//! Logging setup
//!
//! Human-readable or JSON logs on stdout, optionally mirrored to an
//! append-mode log file. `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingConfig;
use crate::error::{Result, StratumError};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging based on configuration
///
/// `verbose` raises the default level to `debug` for this crate when
/// `RUST_LOG` is unset.
///
/// # Errors
///
/// Returns error if the filter is invalid, the log file cannot be opened, or
/// a global subscriber is already installed
///
/// # Examples
///
/// ```no_run
/// use stratum::config::LoggingConfig;
/// use stratum::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     json_format: false,
///     file_path: None,
/// };
/// init_logging(&config, false).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let env_filter = build_filter(config, verbose)?;
    let registry = tracing_subscriber::registry().with(env_filter);
    let file = config.file_path.as_deref().map(open_log_file).transpose()?;

    let installed = if config.json_format {
        let stdout_layer = fmt::layer().json().with_current_span(true);
        let file_layer = file.map(|file| {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(Arc::new(file))
        });
        registry.with(stdout_layer).with(file_layer).try_init()
    } else {
        let stdout_layer = fmt::layer().with_target(true).with_level(true);
        let file_layer = file.map(|file| {
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Arc::new(file))
        });
        registry.with(stdout_layer).with(file_layer).try_init()
    };

    installed.map_err(|e| StratumError::Config(format!("Failed to initialize logging: {}", e)))?;
    Ok(())
}

fn build_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = if verbose {
        "stratum=debug"
    } else {
        config.level.as_str()
    };
    EnvFilter::try_new(level).map_err(|e| {
        StratumError::Config(format!("Invalid log level '{}': {}", level, e)).into()
    })
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_build_filter_from_config() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "stratum=warn".to_string(),
            json_format: false,
            file_path: None,
        };
        let filter = build_filter(&config, false).unwrap();
        assert_eq!(filter.to_string(), "stratum=warn");

        let verbose = build_filter(&config, true).unwrap();
        assert_eq!(verbose.to_string(), "stratum=debug");
    }

    #[test]
    #[serial]
    fn test_build_filter_rejects_garbage() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "stratum=loud".to_string(),
            json_format: false,
            file_path: None,
        };
        assert!(build_filter(&config, false).is_err());
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/agent_run.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
