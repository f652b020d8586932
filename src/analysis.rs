// 📊 Run Analysis - every warehouse aggregation plus the demand forecast
//
// All aggregations read through a single session so the report describes
// one consistent snapshot. Saving the report appends to the analysis log.

use crate::config::AnalysisConfig;
use crate::forecast::{create_demand_forecast, ForecastReport};
use crate::repository::{
    AnalysisRepository, CityAverage, ClientRepository, MonthlyRevenue, PaymentMethodShare,
    SegmentRevenue, ServiceCount, ServicePerformance, ServiceRevenue, TransactionRepository,
};
use crate::warehouse::{Session, Warehouse};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

/// Name the full report is stored under in the analysis log
pub const FULL_ANALYSIS: &str = "full_analysis";

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub top_services: Vec<ServiceCount>,
    pub avg_by_city: Vec<CityAverage>,
    pub max_revenue_service: Option<ServiceRevenue>,
    pub payment_methods: Vec<PaymentMethodShare>,
    pub last_month_revenue: f64,
    pub client_segments: Vec<SegmentRevenue>,
    pub service_performance: Vec<ServicePerformance>,
    pub monthly_trend: Vec<MonthlyRevenue>,
    pub clients_without_transactions: i64,
    pub forecast: ForecastReport,
}

pub struct RunAnalysis<'a> {
    warehouse: &'a Warehouse,
    settings: AnalysisConfig,
}

impl<'a> RunAnalysis<'a> {
    pub fn new(warehouse: &'a Warehouse) -> Self {
        RunAnalysis {
            warehouse,
            settings: AnalysisConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: AnalysisConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn execute(&self, save_results: bool) -> Result<AnalysisReport> {
        info!("Starting analysis");

        let session = self.warehouse.session();
        let outcome = self.analyze(&session).and_then(|report| {
            if save_results {
                self.save(&session, &report)?;
            }
            Ok(report)
        });

        if let Err(err) = &outcome {
            error!(error = %format!("{:#}", err), "Analysis failed");
        }
        session.close().context("Failed to close analysis session")?;

        let report = outcome?;
        info!(
            segments = report.client_segments.len(),
            months = report.monthly_trend.len(),
            forecast_available = report.forecast.available,
            "Analysis completed"
        );
        Ok(report)
    }

    fn analyze(&self, session: &Session<'_>) -> Result<AnalysisReport> {
        let transactions = TransactionRepository::new(session);
        let clients = ClientRepository::new(session);

        let top_services = transactions
            .top_services_by_count(self.settings.top_services_limit)
            .context("Failed to compute top services")?;
        let avg_by_city = transactions
            .avg_amount_by_city()
            .context("Failed to compute average amount by city")?;
        let max_revenue_service = transactions
            .service_with_max_revenue()
            .context("Failed to compute max revenue service")?;
        let payment_methods = transactions
            .payment_method_distribution()
            .context("Failed to compute payment method distribution")?;
        let last_month_revenue = transactions
            .last_month_revenue()
            .context("Failed to compute last month revenue")?;
        debug!("Transaction aggregations done");

        let client_segments = clients
            .detailed_revenue_by_segment()
            .context("Failed to compute revenue by segment")?;
        let clients_without_transactions = clients
            .clients_without_transactions()
            .context("Failed to count clients without transactions")?;
        debug!("Client aggregations done");

        let service_performance = TransactionRepository::enrich_with_percentages(
            transactions
                .service_performance()
                .context("Failed to compute service performance")?,
        );

        let monthly_trend = transactions
            .monthly_revenue_trend(self.settings.trend_months)
            .context("Failed to compute monthly trend")?;
        let forecast = create_demand_forecast(
            &monthly_trend,
            self.settings.forecast_months,
            self.settings.min_months_for_forecast,
        )
        .context("Failed to build forecast")?;
        debug!(available = forecast.available, "Forecast done");

        Ok(AnalysisReport {
            top_services,
            avg_by_city,
            max_revenue_service,
            payment_methods,
            last_month_revenue,
            client_segments,
            service_performance,
            monthly_trend,
            clients_without_transactions,
            forecast,
        })
    }

    fn save(&self, session: &Session<'_>, report: &AnalysisReport) -> Result<()> {
        let parameters = json!({ "timestamp": Utc::now().to_rfc3339() });
        let id = AnalysisRepository::new(session)
            .save_result(FULL_ANALYSIS, report, Some(&parameters))
            .context("Failed to save analysis results")?;
        session.commit().context("Failed to commit analysis results")?;

        info!(id, "Analysis results saved");
        Ok(())
    }
}
