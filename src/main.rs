use anyhow::{bail, Context, Result};
use chrono::Local;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use finance_warehouse::{
    init_logging, should_clear_database, AnalysisReport, AppConfig, BuildWarehouse, CliOverrides,
    Money, RunAnalysis, TrendDirection, Warehouse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Import,
    Analyze,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClearMode {
    /// Clear when the data files changed since the last run
    Auto,
    Force,
    Never,
}

#[derive(Debug)]
struct CliArgs {
    command: Command,
    config_path: Option<PathBuf>,
    overrides: CliOverrides,
    clear: ClearMode,
    save_results: bool,
}

const USAGE: &str = "\
Usage: finance-warehouse [import|analyze|run] [options]

Options:
  --config <file>             TOML config file
  --transactions <file>       Transactions CSV
  --clients <file>            Clients JSON / JSON lines
  --db <file>                 SQLite warehouse file
  --clear-db                  Always rebuild the warehouse
  --no-clear                  Never rebuild the warehouse
  --forecast-months <n>       Months to forecast
  --min-months-forecast <n>   Minimum history for a forecast
  --no-save                   Do not store the report in the warehouse
  --debug                     Human-readable debug logging";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let cli = parse_args(&args)?;
    let config = AppConfig::load(cli.config_path.as_deref(), Some(&cli.overrides))
        .context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!(command = ?cli.command, "Finance warehouse starting");

    match cli.command {
        Command::Import => run_import(&config, cli.clear)?,
        Command::Analyze => run_analyze(&config, cli.save_results)?,
        Command::Run => {
            run_import(&config, cli.clear)?;
            run_analyze(&config, cli.save_results)?;
        }
    }

    Ok(())
}

// ============================================================================
// ARGUMENTS
// ============================================================================

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut cli = CliArgs {
        command: Command::Run,
        config_path: None,
        overrides: CliOverrides::default(),
        clear: ClearMode::Auto,
        save_results: true,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        let mut value = || -> Result<String> {
            iter.next()
                .cloned()
                .with_context(|| format!("Missing value for {}", flag))
        };

        match flag {
            "import" => cli.command = Command::Import,
            "analyze" => cli.command = Command::Analyze,
            "run" => cli.command = Command::Run,
            "--config" => cli.config_path = Some(PathBuf::from(value()?)),
            "--transactions" => cli.overrides.transactions_file = Some(PathBuf::from(value()?)),
            "--clients" => cli.overrides.clients_file = Some(PathBuf::from(value()?)),
            "--db" => cli.overrides.database_file = Some(PathBuf::from(value()?)),
            "--clear-db" => cli.clear = ClearMode::Force,
            "--no-clear" => cli.clear = ClearMode::Never,
            "--forecast-months" => {
                let raw = value()?;
                cli.overrides.forecast_months = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid --forecast-months '{}'", raw))?,
                );
            }
            "--min-months-forecast" => {
                let raw = value()?;
                cli.overrides.min_months_for_forecast = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid --min-months-forecast '{}'", raw))?,
                );
            }
            "--no-save" => cli.save_results = false,
            "--debug" => cli.overrides.debug = Some(true),
            other => bail!("Unknown argument '{}'\n\n{}", other, USAGE),
        }
    }

    Ok(cli)
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_import(config: &AppConfig, clear: ClearMode) -> Result<()> {
    let paths = &config.data_paths;
    for (what, path) in [
        ("Transactions", &paths.transactions_file),
        ("Clients", &paths.clients_file),
    ] {
        if !path.is_file() {
            bail!("{} file not found: {}", what, path.display());
        }
    }

    let db_exists = paths.database_file.is_file();
    let clear_existing = match clear {
        ClearMode::Force => true,
        ClearMode::Never => false,
        ClearMode::Auto => should_clear_database(
            &paths.transactions_file,
            &paths.clients_file,
            &paths.data_hashes_file,
        )?,
    };

    if db_exists && !clear_existing {
        info!(db = %paths.database_file.display(), "Data unchanged, reusing warehouse");
        println!("✓ Warehouse is up to date: {}", paths.database_file.display());
        return Ok(());
    }

    println!("🗄️  Building warehouse...");
    let warehouse = Warehouse::open(&paths.database_file)?;
    let summary = BuildWarehouse::new(&warehouse).execute(
        &paths.transactions_file,
        &paths.clients_file,
        clear_existing,
    )?;
    warehouse.close()?;

    println!(
        "✓ Transactions: {} loaded, {} skipped",
        summary.transactions_loaded, summary.transactions_skipped
    );
    println!(
        "✓ Clients: {} loaded, {} skipped",
        summary.clients_loaded, summary.clients_skipped
    );

    Ok(())
}

fn run_analyze(config: &AppConfig, save_results: bool) -> Result<()> {
    let db_path = &config.data_paths.database_file;
    if !db_path.is_file() {
        eprintln!("❌ Warehouse not found: {}", db_path.display());
        eprintln!("   Run: finance-warehouse import");
        bail!("Warehouse not found");
    }

    println!("📊 Running analysis...");
    let warehouse = Warehouse::open(db_path)?;
    let report = RunAnalysis::new(&warehouse)
        .with_settings(config.analysis.clone())
        .execute(save_results)?;
    warehouse.close()?;

    let report_path = write_report(&report, &config.data_paths.reports_dir)?;
    print_summary(&report);
    println!("\n✓ Report saved to {}", report_path.display());

    Ok(())
}

fn write_report(report: &AnalysisReport, reports_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("Failed to create {}", reports_dir.display()))?;

    let file_name = format!(
        "analysis_results_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = reports_dir.join(file_name);
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "Report written");
    Ok(path)
}

// ============================================================================
// SUMMARY
// ============================================================================

fn money(amount: f64) -> String {
    match Money::from_f64(amount) {
        Ok(m) => m.to_string(),
        Err(err) => {
            warn!(amount, error = %err, "Amount not representable as money");
            format!("{:.2}", amount)
        }
    }
}

fn fit_quality(r2: f64) -> &'static str {
    if r2 > 0.7 {
        "good"
    } else if r2 > 0.3 {
        "medium"
    } else {
        "weak"
    }
}

fn print_summary(report: &AnalysisReport) {
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📈 Analysis summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\nTop services by orders:");
    for (rank, service) in report.top_services.iter().enumerate() {
        println!("  {}. {} ({} orders)", rank + 1, service.service, service.count);
    }

    if let Some(best) = &report.max_revenue_service {
        println!("\nHighest revenue service: {} ({})", best.service, money(best.revenue));
    }

    println!("Last month revenue: {}", money(report.last_month_revenue));

    if !report.payment_methods.is_empty() {
        println!("\nPayment methods:");
        for share in &report.payment_methods {
            println!("  {}: {:.2}%", share.method, share.percentage);
        }
    }

    if !report.client_segments.is_empty() {
        println!("\nRevenue by client segment:");
        for segment in &report.client_segments {
            println!(
                "  {} - {} clients, {} total, {} avg",
                segment.label,
                segment.client_count,
                money(segment.total_revenue),
                money(segment.avg_transaction)
            );
        }
    }
    println!(
        "Clients without transactions: {}",
        report.clients_without_transactions
    );

    let forecast = &report.forecast;
    println!("\nForecast:");
    match (&forecast.prediction, forecast.available) {
        (Some(prediction), true) => {
            for (i, date) in prediction.forecast_dates.iter().enumerate() {
                let count = prediction.count_forecast.get(i).copied().unwrap_or_default();
                let revenue = prediction.revenue_forecast.get(i).copied().unwrap_or_default();
                println!("  {}: {} orders, {}", date, count, money(revenue));
            }
            let trend = |t: Option<TrendDirection>| t.map_or("n/a", |t| t.as_str());
            println!(
                "  Trend: orders {}, revenue {}",
                trend(prediction.count_trend),
                trend(prediction.revenue_trend)
            );
            if let Some(r2) = prediction.metrics.revenue_r2 {
                println!("  Revenue fit R²: {:.3} ({})", r2, fit_quality(r2));
            }
        }
        _ => println!(
            "  Not available: {}",
            forecast.message.as_deref().unwrap_or("unknown reason")
        ),
    }
}
