// 📜 Logging - tracing subscriber setup for the binary
//
// Console output goes to stderr: pretty when `debug` is set, JSON lines
// otherwise. The optional log file always receives JSON lines.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Level filter from `RUST_LOG`, falling back to the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level '{}'", config.log_level)),
    }
}

/// Install the global subscriber. Call once, before any other work.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.debug {
        layers.push(fmt::layer().with_writer(std::io::stderr).with_target(true).boxed());
    } else {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    }

    if config.enable_file_logging {
        fs::create_dir_all(&config.logs_dir).with_context(|| {
            format!("Failed to create logs directory {}", config.logs_dir.display())
        })?;
        let path = config.log_file_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(config)?)
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!(app = %config.app_name, debug = config.debug, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_config_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            log_level: "debug".to_string(),
            ..LoggingConfig::default()
        };
        let filter = build_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }
}
