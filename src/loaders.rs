// 📥 Loaders - turn source files into lazy streams of raw entities
//
// A missing file, unreadable container or missing column fails before the
// first entity is yielded. A bad individual record is logged and skipped.
// Loaders do no validation beyond parsing; that is the cleaner's job.

use crate::entities::{parse_transaction_date, Client, Gender, Transaction};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Cursor};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Common loader seam. `load` returns a finite, non-restartable iterator.
pub trait DataLoader<T>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this loader understands the file (by extension).
    fn supports(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<Box<dyn Iterator<Item = T>>>;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_null_marker(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "" | "null" | "none" | "nan")
}

/// Canonical lowercase UUID when parseable; other non-empty text is passed
/// through untouched so the id rules can reject it.
pub fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_null_marker(trimmed) {
        return None;
    }
    match Uuid::parse_str(trimmed) {
        Ok(uuid) => Some(uuid.hyphenated().to_string()),
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Parse an amount such as `1 234,56`, `1234.56` or `1.5e3`. Sign is kept.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if is_null_marker(&compact) {
        return None;
    }

    let normalized = if compact.contains(',') && !compact.contains('.') {
        compact.replace(',', ".")
    } else {
        compact.replace(',', "")
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// TRANSACTIONS (CSV)
// ============================================================================

pub const TRANSACTION_COLUMNS: [&str; 8] = [
    "transaction_id",
    "client_id",
    "transaction_date",
    "service",
    "amount",
    "payment_method",
    "city",
    "consultant",
];

pub struct TransactionCsvLoader;

impl TransactionCsvLoader {
    pub fn new() -> Self {
        TransactionCsvLoader
    }
}

impl Default for TransactionCsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Column name -> position, for the fixed transaction layout.
struct ColumnIndex(HashMap<&'static str, usize>);

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();

        let missing: Vec<&str> = TRANSACTION_COLUMNS
            .iter()
            .copied()
            .filter(|col| !positions.contains_key(*col))
            .collect();
        if !missing.is_empty() {
            bail!("Missing columns: {}", missing.join(", "));
        }

        Ok(ColumnIndex(
            TRANSACTION_COLUMNS
                .iter()
                .filter_map(|col| positions.get(*col).map(|&i| (*col, i)))
                .collect(),
        ))
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> &'r str {
        self.0
            .get(column)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }
}

fn row_to_transaction(columns: &ColumnIndex, record: &csv::StringRecord) -> Option<Transaction> {
    let id = normalize_id(columns.get(record, "transaction_id"));

    let raw_amount = columns.get(record, "amount");
    let Some(amount) = parse_amount(raw_amount) else {
        warn!(id = ?id, amount = raw_amount, "Skipping transaction: invalid amount");
        return None;
    };

    let mut transaction = Transaction::new(id, amount)
        .with_service(columns.get(record, "service"))
        .with_payment_method(columns.get(record, "payment_method"))
        .with_city(columns.get(record, "city"))
        .with_consultant(columns.get(record, "consultant"));

    if let Some(client_id) = normalize_id(columns.get(record, "client_id")) {
        transaction = transaction.with_client(client_id);
    }
    if let Some(date) = parse_transaction_date(columns.get(record, "transaction_date")) {
        transaction = transaction.with_date(date);
    }

    Some(transaction)
}

impl DataLoader<Transaction> for TransactionCsvLoader {
    fn name(&self) -> &'static str {
        "transactions_csv"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["csv"])
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Iterator<Item = Transaction>>> {
        if !path.is_file() {
            bail!("Transactions file not found: {}", path.display());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header of {}", path.display()))?
            .clone();
        let columns = ColumnIndex::from_headers(&headers)
            .with_context(|| format!("Invalid transactions file {}", path.display()))?;

        info!(path = %path.display(), "Loading transactions");

        let rows = reader
            .into_records()
            .enumerate()
            .filter_map(move |(line, record)| match record {
                Ok(record) => row_to_transaction(&columns, &record),
                Err(err) => {
                    warn!(line = line + 2, error = %err, "Failed to parse row");
                    None
                }
            });

        Ok(Box::new(rows))
    }
}

// ============================================================================
// CLIENTS (JSON array or JSON lines)
// ============================================================================

pub struct ClientJsonLoader;

impl ClientJsonLoader {
    pub fn new() -> Self {
        ClientJsonLoader
    }
}

impl Default for ClientJsonLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_null_marker(s.trim()) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `Ok(None)` for an absent value, `Err` for one that is present but unusable.
fn parse_age(value: Option<&Value>) -> Result<Option<i64>, String> {
    let Some(text) = value.and_then(text_of) else {
        return Ok(None);
    };
    let age: f64 = text.parse().map_err(|_| format!("invalid age '{}'", text))?;
    if age.fract() != 0.0 || !age.is_finite() {
        return Err(format!("non-integer age '{}'", text));
    }
    Ok(Some(age as i64))
}

fn parse_net_worth(value: Option<&Value>) -> Result<Option<f64>, String> {
    let Some(text) = value.and_then(text_of) else {
        return Ok(None);
    };
    parse_amount(&text)
        .map(Some)
        .ok_or_else(|| format!("invalid net worth '{}'", text))
}

fn value_to_client(value: &Value) -> Option<Client> {
    let Some(object) = value.as_object() else {
        warn!("Skipping non-object client record");
        return None;
    };

    let id = object.get("id").and_then(text_of).and_then(|id| normalize_id(&id));
    let parsed = parse_age(object.get("age"))
        .and_then(|age| parse_net_worth(object.get("net_worth")).map(|nw| (age, nw)));

    let (age, net_worth) = match parsed {
        Ok(fields) => fields,
        Err(reason) => {
            warn!(id = ?id, reason = %reason, "Skipping client record");
            return None;
        }
    };

    let gender = object
        .get("gender")
        .and_then(Value::as_str)
        .map(Gender::from_label)
        .unwrap_or_default();

    let mut client = Client::new(id).with_gender(gender);
    if let Some(age) = age {
        client = client.with_age(age);
    }
    if let Some(net_worth) = net_worth {
        client = client.with_net_worth(net_worth);
    }
    Some(client)
}

impl DataLoader<Client> for ClientJsonLoader {
    fn name(&self) -> &'static str {
        "clients_json"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["json", "jsonl"])
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Iterator<Item = Client>>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Clients file not found or unreadable: {}", path.display()))?;

        let trimmed = content.trim_start();
        if trimmed.is_empty() {
            bail!("File is empty: {}", path.display());
        }

        info!(path = %path.display(), "Loading clients");

        if trimmed.starts_with('[') {
            let records: Vec<Value> = serde_json::from_str(trimmed)
                .with_context(|| format!("Invalid JSON format in {}", path.display()))?;
            info!(records = records.len(), "Found clients in JSON array");

            return Ok(Box::new(
                records.into_iter().filter_map(|record| value_to_client(&record)),
            ));
        }

        let lines = Cursor::new(content)
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = line.ok()?;
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(record) => value_to_client(&record),
                    Err(err) => {
                        warn!(line = index + 1, error = %err, "Failed to parse line");
                        None
                    }
                }
            });

        Ok(Box::new(lines))
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Picks the registered loader that supports a file. Later registrations
/// take precedence.
pub struct LoaderFactory {
    transaction_loaders: Vec<Box<dyn DataLoader<Transaction>>>,
    client_loaders: Vec<Box<dyn DataLoader<Client>>>,
}

impl LoaderFactory {
    pub fn new() -> Self {
        LoaderFactory {
            transaction_loaders: vec![Box::new(TransactionCsvLoader::new())],
            client_loaders: vec![Box::new(ClientJsonLoader::new())],
        }
    }

    pub fn register_transaction_loader(&mut self, loader: Box<dyn DataLoader<Transaction>>) {
        self.transaction_loaders.push(loader);
    }

    pub fn register_client_loader(&mut self, loader: Box<dyn DataLoader<Client>>) {
        self.client_loaders.push(loader);
    }

    pub fn transaction_loader(&self, path: &Path) -> Result<&dyn DataLoader<Transaction>> {
        self.transaction_loaders
            .iter()
            .rev()
            .find(|loader| loader.supports(path))
            .map(|loader| loader.as_ref())
            .with_context(|| format!("No transaction loader found for {}", path.display()))
    }

    pub fn client_loader(&self, path: &Path) -> Result<&dyn DataLoader<Client>> {
        self.client_loaders
            .iter()
            .rev()
            .find(|loader| loader.supports(path))
            .map(|loader| loader.as_ref())
            .with_context(|| format!("No client loader found for {}", path.display()))
    }
}

impl Default for LoaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
