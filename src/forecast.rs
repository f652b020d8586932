// 📈 Demand Forecast - linear trend over monthly counts and revenue
//
// Two independent least-squares lines (counts, revenue) against days elapsed
// since the first period. `DemandForecast::fit` consumes the unfitted model
// and returns a `FittedForecast`; only the fitted state can predict.

use crate::entities::round_half_up;
use crate::error::ForecastError;
use crate::repository::MonthlyRevenue;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Default spacing of predicted periods
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Periods needed before `seasonality` reports anything
pub const SEASONALITY_MIN_PERIODS: usize = 12;

pub const NO_MODEL_MESSAGE: &str = "No models available for prediction";

const ISO_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S";

// ============================================================================
// TREND LINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    /// Sign of the slope; exactly zero is stable.
    pub fn from_slope(slope: f64) -> Self {
        if slope > 0.0 {
            TrendDirection::Increasing
        } else if slope < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

/// `y = intercept + slope * x`, ordinary least squares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// `None` with fewer than two points. Identical x values give a flat line
    /// through the mean.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len().min(ys.len());
        if n < 2 {
            return None;
        }

        let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
        let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

        let (sxy, sxx) = xs[..n]
            .iter()
            .zip(&ys[..n])
            .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
                let dx = x - mean_x;
                (sxy + dx * (y - mean_y), sxx + dx * dx)
            });

        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        Some(LinearTrend {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    pub fn direction(&self) -> TrendDirection {
        TrendDirection::from_slope(self.slope)
    }
}

/// Fit quality against the training data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitMetrics {
    pub mae: f64,
    pub r2: f64,
}

impl FitMetrics {
    /// R² follows the usual convention for a constant target: 1.0 on a
    /// perfect fit, 0.0 otherwise.
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return FitMetrics { mae: 0.0, r2: 0.0 };
        }

        let mean = actual[..n].iter().sum::<f64>() / n as f64;
        let mut abs_err = 0.0;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (a, p) in actual[..n].iter().zip(&predicted[..n]) {
            abs_err += (a - p).abs();
            ss_res += (a - p).powi(2);
            ss_tot += (a - mean).powi(2);
        }

        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        FitMetrics {
            mae: abs_err / n as f64,
            r2,
        }
    }
}

// ============================================================================
// FORECAST MODEL (typestate: DemandForecast -> FittedForecast)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct HistoryPoint {
    date: NaiveDate,
    days: f64,
    count: f64,
    revenue: f64,
}

/// Unfitted model.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemandForecast;

impl DemandForecast {
    pub fn new() -> Self {
        DemandForecast
    }

    /// Train both trend lines. A series with fewer than two points gets no
    /// model; that is not an error.
    pub fn fit(
        self,
        periods: &[NaiveDate],
        counts: &[i64],
        revenues: &[f64],
    ) -> Result<FittedForecast, ForecastError> {
        if periods.len() != counts.len() || periods.len() != revenues.len() {
            return Err(ForecastError::LengthMismatch {
                periods: periods.len(),
                counts: counts.len(),
                revenues: revenues.len(),
            });
        }

        let mut rows: Vec<(NaiveDate, i64, f64)> = periods
            .iter()
            .zip(counts)
            .zip(revenues)
            .map(|((d, c), r)| (*d, *c, *r))
            .collect();
        rows.sort_by_key(|(date, _, _)| *date);

        let history: Vec<HistoryPoint> = match rows.first() {
            Some(&(first, _, _)) => rows
                .iter()
                .map(|&(date, count, revenue)| HistoryPoint {
                    date,
                    days: (date - first).num_days() as f64,
                    count: count as f64,
                    revenue,
                })
                .collect(),
            None => Vec::new(),
        };

        let xs: Vec<f64> = history.iter().map(|p| p.days).collect();
        let count_ys: Vec<f64> = history.iter().map(|p| p.count).collect();
        let revenue_ys: Vec<f64> = history.iter().map(|p| p.revenue).collect();

        let count_model = LinearTrend::fit(&xs, &count_ys);
        let revenue_model = LinearTrend::fit(&xs, &revenue_ys);

        info!(
            data_points = history.len(),
            count_model = count_model.is_some(),
            revenue_model = revenue_model.is_some(),
            "Forecast models fitted"
        );

        Ok(FittedForecast {
            history,
            count_model,
            revenue_model,
        })
    }
}

/// Fitted model; holds the sorted training history.
#[derive(Debug, Clone)]
pub struct FittedForecast {
    history: Vec<HistoryPoint>,
    count_model: Option<LinearTrend>,
    revenue_model: Option<LinearTrend>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_mae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_r2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_mae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_r2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub forecast_periods: u32,
    pub period_days: i64,
    pub forecast_dates: Vec<String>,
    /// Rounded to whole transactions, never negative
    pub count_forecast: Vec<i64>,
    /// Rounded to cents, never negative
    pub revenue_forecast: Vec<f64>,
    pub metrics: ForecastMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_trend: Option<TrendDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_trend: Option<TrendDirection>,
}

impl FittedForecast {
    pub fn count_model(&self) -> Option<&LinearTrend> {
        self.count_model.as_ref()
    }

    pub fn revenue_model(&self) -> Option<&LinearTrend> {
        self.revenue_model.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Forecast `periods` future points spaced `period_days` apart after the
    /// last historical period. `None` when neither series has a model.
    pub fn predict(&self, periods: u32, period_days: i64) -> Option<Prediction> {
        if self.count_model.is_none() && self.revenue_model.is_none() {
            return None;
        }

        let first = self.history.first()?.date;
        let last = self.history.last()?.date;

        let future_dates: Vec<NaiveDate> = (1..=i64::from(periods))
            .map(|i| last + Duration::days(i * period_days))
            .collect();
        let future_days: Vec<f64> = future_dates
            .iter()
            .map(|d| (*d - first).num_days() as f64)
            .collect();

        let xs: Vec<f64> = self.history.iter().map(|p| p.days).collect();
        let mut prediction = Prediction {
            forecast_periods: periods,
            period_days,
            forecast_dates: future_dates
                .iter()
                .filter_map(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.format(ISO_DATE_TIME).to_string())
                .collect(),
            count_forecast: Vec::new(),
            revenue_forecast: Vec::new(),
            metrics: ForecastMetrics::default(),
            count_trend: None,
            revenue_trend: None,
        };

        if let Some(model) = &self.count_model {
            prediction.count_forecast = future_days
                .iter()
                .map(|&x| model.predict(x).max(0.0).round() as i64)
                .collect();

            let actual: Vec<f64> = self.history.iter().map(|p| p.count).collect();
            let fitted: Vec<f64> = xs.iter().map(|&x| model.predict(x)).collect();
            let metrics = FitMetrics::evaluate(&actual, &fitted);
            prediction.metrics.count_mae = Some(metrics.mae);
            prediction.metrics.count_r2 = Some(metrics.r2);
            prediction.count_trend = Some(model.direction());
        }

        if let Some(model) = &self.revenue_model {
            prediction.revenue_forecast = future_days
                .iter()
                .map(|&x| round_half_up(model.predict(x).max(0.0)))
                .collect();

            let actual: Vec<f64> = self.history.iter().map(|p| p.revenue).collect();
            let fitted: Vec<f64> = xs.iter().map(|&x| model.predict(x)).collect();
            let metrics = FitMetrics::evaluate(&actual, &fitted);
            prediction.metrics.revenue_mae = Some(metrics.mae);
            prediction.metrics.revenue_r2 = Some(metrics.r2);
            prediction.revenue_trend = Some(model.direction());
        }

        Some(prediction)
    }

    /// Average count per calendar month (`month_01` … `month_12`); empty with
    /// less than a year of history.
    pub fn seasonality(&self) -> BTreeMap<String, f64> {
        if self.history.len() < SEASONALITY_MIN_PERIODS {
            return BTreeMap::new();
        }

        let mut buckets: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for point in &self.history {
            let entry = buckets.entry(point.date.month()).or_insert((0.0, 0));
            entry.0 += point.count;
            entry.1 += 1;
        }

        buckets
            .into_iter()
            .map(|(month, (sum, n))| (format!("month_{:02}", month), sum / n as f64))
            .collect()
    }
}

// ============================================================================
// ORCHESTRATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    pub dates: Vec<String>,
    pub counts: Vec<i64>,
    pub revenues: Vec<f64>,
}

/// Forecast section of the analysis output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub required_months: usize,
    pub available_months: usize,
    #[serde(flatten)]
    pub prediction: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<HistoricalData>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub seasonality: BTreeMap<String, f64>,
}

impl ForecastReport {
    fn unavailable(message: String, required: usize, available: usize) -> Self {
        ForecastReport {
            available: false,
            message: Some(message),
            required_months: required,
            available_months: available,
            prediction: None,
            historical_data: None,
            seasonality: BTreeMap::new(),
        }
    }
}

/// Parse a `YYYY-M` / `YYYY-MM` period key into the first day of that month.
pub fn parse_period(period: &str) -> Result<NaiveDate, ForecastError> {
    let invalid = || ForecastError::InvalidPeriod(period.to_string());

    let (year, month) = period.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

/// Forecast `forecast_months` periods from a monthly trend. Fewer than
/// `min_months` periods yields an unavailable report naming both counts.
pub fn create_demand_forecast(
    monthly: &[MonthlyRevenue],
    forecast_months: u32,
    min_months: usize,
) -> Result<ForecastReport, ForecastError> {
    if monthly.len() < min_months {
        return Ok(ForecastReport::unavailable(
            format!(
                "Insufficient data: need {} months, have {}",
                min_months,
                monthly.len()
            ),
            min_months,
            monthly.len(),
        ));
    }

    let dates = monthly
        .iter()
        .map(|m| parse_period(&m.period))
        .collect::<Result<Vec<_>, _>>()?;
    let counts: Vec<i64> = monthly.iter().map(|m| m.transaction_count).collect();
    let revenues: Vec<f64> = monthly.iter().map(|m| m.revenue).collect();

    let fitted = DemandForecast::new().fit(&dates, &counts, &revenues)?;
    let Some(prediction) = fitted.predict(forecast_months, DEFAULT_PERIOD_DAYS) else {
        return Ok(ForecastReport::unavailable(
            NO_MODEL_MESSAGE.to_string(),
            min_months,
            monthly.len(),
        ));
    };

    Ok(ForecastReport {
        available: true,
        message: None,
        required_months: min_months,
        available_months: monthly.len(),
        prediction: Some(prediction),
        historical_data: Some(HistoricalData {
            dates: dates
                .iter()
                .filter_map(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.format(ISO_DATE_TIME).to_string())
                .collect(),
            counts,
            revenues,
        }),
        seasonality: fitted.seasonality(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
