// 💳 Transaction Repository - upsert + revenue/service aggregations
//
// Grouping is by the raw service / payment-method label as stored, so
// unrecognised labels stay visible under their own name.

use super::{percentage, round2};
use crate::entities::{Transaction, DATE_TIME_FORMAT};
use crate::error::{StorageError, StorageResult};
use crate::warehouse::Session;
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error};

const UPSERT_TRANSACTION: &str = "
    INSERT INTO transactions (
        id, client_id, raw_service, raw_payment_method, transaction_date,
        amount, city, consultant, service_category, payment_method_category
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(id) DO UPDATE SET
        client_id = excluded.client_id,
        raw_service = excluded.raw_service,
        raw_payment_method = excluded.raw_payment_method,
        transaction_date = excluded.transaction_date,
        amount = excluded.amount,
        city = excluded.city,
        consultant = excluded.consultant,
        service_category = excluded.service_category,
        payment_method_category = excluded.payment_method_category";

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCount {
    pub service: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityAverage {
    pub city: String,
    pub avg_amount: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRevenue {
    pub service: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodShare {
    pub method: String,
    pub percentage: f64,
}

/// One calendar month of revenue. `period` is zero-padded `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub period: String,
    pub revenue: f64,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePerformance {
    pub service: String,
    pub order_count: i64,
    pub total_revenue: f64,
    pub avg_amount: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub revenue_percentage: f64,
    pub order_percentage: f64,
}

// ============================================================================
// REPOSITORY
// ============================================================================

pub struct TransactionRepository<'s, 'w> {
    session: &'s Session<'w>,
    /// Identities already written by the current `add_many` call
    seen_in_batch: HashSet<String>,
}

impl<'s, 'w> TransactionRepository<'s, 'w> {
    pub fn new(session: &'s Session<'w>) -> Self {
        TransactionRepository {
            session,
            seen_in_batch: HashSet::new(),
        }
    }

    /// Insert or fully replace by id. Returns `false` when the transaction
    /// has no id and was skipped.
    pub fn add(&self, transaction: &Transaction) -> StorageResult<bool> {
        let id = match transaction.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("Skipping transaction without ID");
                return Ok(false);
            }
        };

        let conn = self.session.connection()?;
        let mut stmt = conn.prepare_cached(UPSERT_TRANSACTION)?;
        stmt.execute(params![
            id,
            transaction.client_id,
            transaction.raw_service,
            transaction.raw_payment_method,
            transaction
                .transaction_date
                .map(|d| d.format(DATE_TIME_FORMAT).to_string()),
            transaction.amount,
            transaction.city,
            transaction.consultant,
            transaction.service_category().as_str(),
            transaction.payment_method_category().as_str(),
        ])?;

        Ok(true)
    }

    /// Upsert a batch. Repeated ids inside the batch are written once (first
    /// occurrence). An integrity failure rolls the session back and is
    /// returned to the caller.
    pub fn add_many<I>(&mut self, transactions: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = Transaction>,
    {
        self.seen_in_batch.clear();
        match self.write_batch(transactions) {
            Ok(written) => Ok(written),
            Err(err) => {
                error!(error = %err, "Integrity error during bulk insert");
                self.session.rollback()?;
                Err(err)
            }
        }
    }

    fn write_batch<I>(&mut self, transactions: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut written = 0;
        for transaction in transactions {
            if let Some(id) = transaction.id.as_deref() {
                if self.seen_in_batch.contains(id) {
                    continue;
                }
            }
            if self.add(&transaction)? {
                written += 1;
                if let Some(id) = transaction.id {
                    self.seen_in_batch.insert(id);
                }
            }
        }
        self.session.flush()?;
        Ok(written)
    }

    pub fn clear_batch_cache(&mut self) {
        self.seen_in_batch.clear();
    }

    pub fn count(&self) -> StorageResult<i64> {
        let conn = self.session.connection()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?)
    }

    // ------------------------------------------------------------------------
    // Aggregations
    // ------------------------------------------------------------------------

    /// Top `limit` services by order count; ties keep insertion order.
    pub fn top_services_by_count(&self, limit: usize) -> StorageResult<Vec<ServiceCount>> {
        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT raw_service, COUNT(*) AS order_count
             FROM transactions
             GROUP BY raw_service
             ORDER BY order_count DESC, MIN(rowid) ASC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(ServiceCount {
                    service: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn avg_amount_by_city(&self) -> StorageResult<Vec<CityAverage>> {
        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT city, AVG(amount) AS avg_amount, COUNT(*)
             FROM transactions
             WHERE city IS NOT NULL
             GROUP BY city
             ORDER BY avg_amount DESC, city ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CityAverage {
                    city: row.get(0)?,
                    avg_amount: round2(row.get(1)?),
                    count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// `None` on an empty table.
    pub fn service_with_max_revenue(&self) -> StorageResult<Option<ServiceRevenue>> {
        let conn = self.session.connection()?;
        let top = conn
            .query_row(
                "SELECT raw_service, SUM(amount) AS total_revenue
                 FROM transactions
                 GROUP BY raw_service
                 ORDER BY total_revenue DESC, MIN(rowid) ASC
                 LIMIT 1",
                [],
                |row| {
                    Ok(ServiceRevenue {
                        service: row.get(0)?,
                        revenue: round2(row.get(1)?),
                    })
                },
            )
            .optional()?;

        Ok(top)
    }

    /// Share of each raw payment method in the transaction count, largest first.
    pub fn payment_method_distribution(&self) -> StorageResult<Vec<PaymentMethodShare>> {
        let total = self.count()?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT raw_payment_method, COUNT(*) AS method_count
             FROM transactions
             GROUP BY raw_payment_method
             ORDER BY method_count DESC, MIN(rowid) ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok(PaymentMethodShare {
                    method: row.get(0)?,
                    percentage: percentage(count as f64, total as f64),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Latest transaction date present in the data.
    pub fn max_transaction_date(&self) -> StorageResult<Option<NaiveDateTime>> {
        let conn = self.session.connection()?;
        let raw: Option<String> = conn.query_row(
            "SELECT MAX(transaction_date) FROM transactions",
            [],
            |row| row.get(0),
        )?;

        raw.map(|text| {
            NaiveDateTime::parse_from_str(&text, DATE_TIME_FORMAT).map_err(|e| {
                StorageError::InvalidRow {
                    table: "transactions".to_string(),
                    message: format!("transaction_date '{}': {}", text, e),
                }
            })
        })
        .transpose()
    }

    /// Revenue of the calendar month before the month of the latest
    /// transaction, `[prev_month_start, this_month_start)`. 0 on empty data.
    pub fn last_month_revenue(&self) -> StorageResult<f64> {
        let Some(max_date) = self.max_transaction_date()? else {
            return Ok(0.0);
        };

        let this_month_start = month_start(max_date.date());
        let Some(prev_month_start) = this_month_start.checked_sub_months(Months::new(1)) else {
            return Ok(0.0);
        };

        let conn = self.session.connection()?;
        let revenue: Option<f64> = conn.query_row(
            "SELECT SUM(amount) FROM transactions
             WHERE transaction_date >= ?1 AND transaction_date < ?2",
            params![format_day(prev_month_start), format_day(this_month_start)],
            |row| row.get(0),
        )?;

        Ok(round2(revenue.unwrap_or(0.0)))
    }

    /// Revenue and order count per month for the `months` calendar months
    /// ending with the month of the latest transaction, oldest first.
    pub fn monthly_revenue_trend(&self, months: u32) -> StorageResult<Vec<MonthlyRevenue>> {
        let Some(max_date) = self.max_transaction_date()? else {
            return Ok(Vec::new());
        };

        let back = months.max(1) - 1;
        let since = month_start(max_date.date())
            .checked_sub_months(Months::new(back))
            .unwrap_or(NaiveDate::MIN);

        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT strftime('%Y-%m', transaction_date) AS period,
                    SUM(amount), COUNT(*)
             FROM transactions
             WHERE transaction_date >= ?1
             GROUP BY period
             ORDER BY period ASC",
        )?;

        let rows = stmt
            .query_map([format_day(since)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(period, revenue, count)| {
                let (year, month) = split_period(&period)?;
                Ok(MonthlyRevenue {
                    year,
                    month,
                    period,
                    revenue: round2(revenue.unwrap_or(0.0)),
                    transaction_count: count,
                })
            })
            .collect()
    }

    /// Per-service order count and revenue statistics, highest revenue first.
    /// Percentages are left at 0; see [`Self::enrich_with_percentages`].
    pub fn service_performance(&self) -> StorageResult<Vec<ServicePerformance>> {
        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT raw_service, COUNT(*), SUM(amount) AS total_revenue,
                    AVG(amount), MIN(amount), MAX(amount)
             FROM transactions
             GROUP BY raw_service
             ORDER BY total_revenue DESC, MIN(rowid) ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ServicePerformance {
                    service: row.get(0)?,
                    order_count: row.get(1)?,
                    total_revenue: round2(row.get(2)?),
                    avg_amount: round2(row.get(3)?),
                    min_amount: row.get(4)?,
                    max_amount: row.get(5)?,
                    revenue_percentage: 0.0,
                    order_percentage: 0.0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Fill revenue/order percentages relative to the grand totals of the list.
    pub fn enrich_with_percentages(
        mut services: Vec<ServicePerformance>,
    ) -> Vec<ServicePerformance> {
        let total_revenue: f64 = services.iter().map(|s| s.total_revenue).sum();
        let total_orders: i64 = services.iter().map(|s| s.order_count).sum();

        for service in &mut services {
            service.revenue_percentage = percentage(service.total_revenue, total_revenue);
            service.order_percentage = percentage(service.order_count as f64, total_orders as f64);
        }

        services
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn format_day(date: NaiveDate) -> String {
    format!("{} 00:00:00", date.format("%Y-%m-%d"))
}

fn split_period(period: &str) -> StorageResult<(i32, u32)> {
    let invalid = || StorageError::InvalidRow {
        table: "transactions".to_string(),
        message: format!("unexpected period '{}'", period),
    };

    let (year, month) = period.split_once('-').ok_or_else(invalid)?;
    Ok((
        year.parse().map_err(|_| invalid())?,
        month.parse().map_err(|_| invalid())?,
    ))
}

// ============================================================================
// TESTS
// ============================================================================
