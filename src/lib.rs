// Finance Warehouse - Core Library
// Exposes all modules for use in the CLI and tests

pub mod entities;
pub mod error;
pub mod rules;       // Validation rules per entity
pub mod cleaner;     // Rule chains: keep / fix / drop
pub mod loaders;     // CSV + JSON readers, picked by extension
pub mod warehouse;   // SQLite schema + session (unit of work)
pub mod repository;  // Upserts and analytical queries
pub mod forecast;    // Linear-trend demand forecast
pub mod pipeline;    // Build Warehouse use case
pub mod analysis;    // Run Analysis use case
pub mod fingerprint; // Data file hashes between runs
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use entities::{
    Client, Gender, NetWorthLevel, UNKNOWN_SEGMENT,
    Money, round_half_up, round_to,
    Transaction, FinanceServiceType, PaymentMethod, DATE_TIME_FORMAT,
};
pub use error::{ConfigError, ForecastError, StorageError, StorageResult};
pub use rules::{
    RuleKind, RuleVerdict, ValidationRule,
    default_client_rules, default_transaction_rules,
};
pub use cleaner::{Cleaner, CleaningStats, ClientCleaner, TransactionCleaner};
pub use loaders::{ClientJsonLoader, DataLoader, LoaderFactory, TransactionCsvLoader};
pub use warehouse::{Session, Warehouse};
pub use repository::{
    AnalysisRecord, AnalysisRepository,
    ClientRepository, LevelRevenue, SegmentRevenue,
    CityAverage, MonthlyRevenue, PaymentMethodShare, ServiceCount, ServicePerformance,
    ServiceRevenue, TransactionRepository,
};
pub use forecast::{
    create_demand_forecast, DemandForecast, FittedForecast, ForecastReport, Prediction,
    TrendDirection,
};
pub use pipeline::{BuildWarehouse, LoadSummary};
pub use analysis::{AnalysisReport, RunAnalysis, FULL_ANALYSIS};
pub use fingerprint::{should_clear_database, DataFingerprint};
pub use config::{AnalysisConfig, AppConfig, CliOverrides, DataPathsConfig, LoggingConfig};
pub use logging::init_logging;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
