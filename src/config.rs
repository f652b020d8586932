// ⚙️ Configuration - layered application settings
//
// Resolution order (highest priority first):
// 1. CLI flags (`CliOverrides`)
// 2. Environment variables (`FINWH_<SECTION>__<KEY>`)
// 3. TOML file (explicit path, or `finance-warehouse.toml` in the cwd)
// 4. Compiled defaults

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "finance-warehouse.toml";
pub const ENV_PREFIX: &str = "FINWH_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPathsConfig {
    pub transactions_file: PathBuf,
    pub clients_file: PathBuf,
    pub database_file: PathBuf,
    pub reports_dir: PathBuf,
    /// Fingerprints of the last imported data files
    pub data_hashes_file: PathBuf,
}

impl Default for DataPathsConfig {
    fn default() -> Self {
        DataPathsConfig {
            transactions_file: PathBuf::from("data/transactions_data.csv"),
            clients_file: PathBuf::from("data/clients_data.json"),
            database_file: PathBuf::from("warehouse.db"),
            reports_dir: PathBuf::from("reports"),
            data_hashes_file: PathBuf::from(".data_hashes.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub top_services_limit: usize,
    pub forecast_months: u32,
    pub min_months_for_forecast: usize,
    /// Window of the monthly revenue trend, in calendar months
    pub trend_months: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            top_services_limit: 5,
            forecast_months: 1,
            min_months_for_forecast: 3,
            trend_months: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,
    /// Human-readable output instead of JSON lines
    pub debug: bool,
    pub log_level: String,
    pub enable_file_logging: bool,
    pub logs_dir: PathBuf,
    pub logs_file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            app_name: "finance-warehouse".to_string(),
            debug: false,
            log_level: "info".to_string(),
            enable_file_logging: false,
            logs_dir: PathBuf::from("logs"),
            logs_file_name: "app.log".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_file_path(&self) -> PathBuf {
        self.logs_dir.join(&self.logs_file_name)
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_paths: DataPathsConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub transactions_file: Option<PathBuf>,
    pub clients_file: Option<PathBuf>,
    pub database_file: Option<PathBuf>,
    pub forecast_months: Option<u32>,
    pub min_months_for_forecast: Option<usize>,
    pub debug: Option<bool>,
}

impl AppConfig {
    /// Resolve all layers and validate the result.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>, cli: Option<&CliOverrides>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        if let Some(cli) = cli {
            config.apply_cli(cli);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `FINWH_*` variables through `lookup` (normally `std::env::var`).
    /// A present but unparsable value is an error, not silently ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(&format!("{}{}", ENV_PREFIX, key));

        if let Some(v) = var("DATA_PATHS__TRANSACTIONS_FILE") {
            self.data_paths.transactions_file = PathBuf::from(v);
        }
        if let Some(v) = var("DATA_PATHS__CLIENTS_FILE") {
            self.data_paths.clients_file = PathBuf::from(v);
        }
        if let Some(v) = var("DATA_PATHS__DATABASE_FILE") {
            self.data_paths.database_file = PathBuf::from(v);
        }
        if let Some(v) = var("DATA_PATHS__REPORTS_DIR") {
            self.data_paths.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = var("DATA_PATHS__DATA_HASHES_FILE") {
            self.data_paths.data_hashes_file = PathBuf::from(v);
        }

        if let Some(v) = var("ANALYSIS__TOP_SERVICES_LIMIT") {
            self.analysis.top_services_limit = parse_env("ANALYSIS__TOP_SERVICES_LIMIT", &v)?;
        }
        if let Some(v) = var("ANALYSIS__FORECAST_MONTHS") {
            self.analysis.forecast_months = parse_env("ANALYSIS__FORECAST_MONTHS", &v)?;
        }
        if let Some(v) = var("ANALYSIS__MIN_MONTHS_FOR_FORECAST") {
            self.analysis.min_months_for_forecast =
                parse_env("ANALYSIS__MIN_MONTHS_FOR_FORECAST", &v)?;
        }
        if let Some(v) = var("ANALYSIS__TREND_MONTHS") {
            self.analysis.trend_months = parse_env("ANALYSIS__TREND_MONTHS", &v)?;
        }

        if let Some(v) = var("LOGGING__APP_NAME") {
            self.logging.app_name = v;
        }
        if let Some(v) = var("LOGGING__DEBUG") {
            self.logging.debug = parse_env("LOGGING__DEBUG", &v)?;
        }
        if let Some(v) = var("LOGGING__LOG_LEVEL") {
            self.logging.log_level = v.to_lowercase();
        }
        if let Some(v) = var("LOGGING__ENABLE_FILE_LOGGING") {
            self.logging.enable_file_logging = parse_env("LOGGING__ENABLE_FILE_LOGGING", &v)?;
        }
        if let Some(v) = var("LOGGING__LOGS_DIR") {
            self.logging.logs_dir = PathBuf::from(v);
        }
        if let Some(v) = var("LOGGING__LOGS_FILE_NAME") {
            self.logging.logs_file_name = v;
        }

        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(path) = &cli.transactions_file {
            self.data_paths.transactions_file = path.clone();
        }
        if let Some(path) = &cli.clients_file {
            self.data_paths.clients_file = path.clone();
        }
        if let Some(path) = &cli.database_file {
            self.data_paths.database_file = path.clone();
        }
        if let Some(months) = cli.forecast_months {
            self.analysis.forecast_months = months;
        }
        if let Some(months) = cli.min_months_for_forecast {
            self.analysis.min_months_for_forecast = months;
        }
        if let Some(debug) = cli.debug {
            self.logging.debug = debug;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let analysis = &self.analysis;
        if !(1..=20).contains(&analysis.top_services_limit) {
            return Err(invalid("analysis.top_services_limit", "must be between 1 and 20"));
        }
        if !(1..=12).contains(&analysis.forecast_months) {
            return Err(invalid("analysis.forecast_months", "must be between 1 and 12"));
        }
        if analysis.min_months_for_forecast < 1 {
            return Err(invalid("analysis.min_months_for_forecast", "must be at least 1"));
        }
        if analysis.trend_months < 1 {
            return Err(invalid("analysis.trend_months", "must be at least 1"));
        }
        if !LOG_LEVELS.contains(&self.logging.log_level.as_str()) {
            return Err(invalid(
                "logging.log_level",
                "must be one of trace, debug, info, warn, error",
            ));
        }
        if self.logging.enable_file_logging && self.logging.logs_file_name.trim().is_empty() {
            return Err(invalid("logging.logs_file_name", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationFailed {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::ValidationFailed {
        field: format!("{}{}", ENV_PREFIX, key),
        message: format!("cannot parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.top_services_limit, 5);
        assert_eq!(config.analysis.min_months_for_forecast, 3);
        assert_eq!(config.data_paths.database_file, PathBuf::from("warehouse.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [analysis]
            forecast_months = 3

            [logging]
            debug = true
            "#,
        )
        .unwrap();

        assert_eq!(config.analysis.forecast_months, 3);
        assert_eq!(config.analysis.trend_months, 12);
        assert!(config.logging.debug);
        assert_eq!(config.data_paths, DataPathsConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml("[analysis\nforecast_months = 1"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides_file_and_cli_overrides_env() {
        let mut config = AppConfig::from_toml("[analysis]\nforecast_months = 2").unwrap();

        config
            .apply_env(env(&[
                ("FINWH_ANALYSIS__FORECAST_MONTHS", "4"),
                ("FINWH_DATA_PATHS__DATABASE_FILE", "/tmp/wh.db"),
                ("FINWH_LOGGING__LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();
        assert_eq!(config.analysis.forecast_months, 4);
        assert_eq!(config.data_paths.database_file, PathBuf::from("/tmp/wh.db"));
        assert_eq!(config.logging.log_level, "debug");

        config.apply_cli(&CliOverrides {
            forecast_months: Some(6),
            ..CliOverrides::default()
        });
        assert_eq!(config.analysis.forecast_months, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_env_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("FINWH_ANALYSIS__TREND_MONTHS", "soon")]))
            .unwrap_err();

        match err {
            ConfigError::ValidationFailed { field, .. } => {
                assert_eq!(field, "FINWH_ANALYSIS__TREND_MONTHS")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = AppConfig::default();
        config.analysis.forecast_months = 13;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.top_services_limit = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.min_months_for_forecast = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[data_paths]\nreports_dir = \"out\"").unwrap();

        let cli = CliOverrides {
            database_file: Some(PathBuf::from("cli.db")),
            ..CliOverrides::default()
        };
        let config = AppConfig::load(Some(file.path()), Some(&cli)).unwrap();

        assert_eq!(config.data_paths.reports_dir, PathBuf::from("out"));
        assert_eq!(config.data_paths.database_file, PathBuf::from("cli.db"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/finwh.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
