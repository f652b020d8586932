// 💳 Transaction Entity - one paid service order
//
// Raw service / payment-method labels are kept verbatim; categorisation into
// the fixed enumerations is derived and falls back to `Unknown`.

use crate::entities::money::round_half_up;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Storage and display format for transaction timestamps
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_DATE_TIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d.%m.%Y %H:%M:%S"];

/// Free-text values that mean "nobody knows"
const UNKNOWN_PHRASES: [&str; 5] = [
    "unknown",
    "unknown consultant",
    "n/a",
    "неизвестно",
    "неизвестный консультант",
];

// ============================================================================
// SERVICE TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinanceServiceType {
    CapitalStructuring,
    InvestmentAdvisory,
    FinancialPlanning,
    AssetManagement,
    TaxPlanning,
    Unknown,
}

impl FinanceServiceType {
    const KNOWN: [FinanceServiceType; 5] = [
        FinanceServiceType::CapitalStructuring,
        FinanceServiceType::InvestmentAdvisory,
        FinanceServiceType::FinancialPlanning,
        FinanceServiceType::AssetManagement,
        FinanceServiceType::TaxPlanning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FinanceServiceType::CapitalStructuring => "Capital structuring",
            FinanceServiceType::InvestmentAdvisory => "Investment advisory",
            FinanceServiceType::FinancialPlanning => "Financial planning",
            FinanceServiceType::AssetManagement => "Asset management",
            FinanceServiceType::TaxPlanning => "Tax planning",
            FinanceServiceType::Unknown => "Unknown service",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            FinanceServiceType::CapitalStructuring => &["структурирование капитала"],
            FinanceServiceType::InvestmentAdvisory => &["инвестиционное консультирование"],
            FinanceServiceType::FinancialPlanning => &["финансовое планирование"],
            FinanceServiceType::AssetManagement => &["управление активами"],
            FinanceServiceType::TaxPlanning => &["налоговое планирование"],
            FinanceServiceType::Unknown => &[],
        }
    }

    /// Categorise a raw label (canonical name or alias, case-insensitive).
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|s| s.as_str().to_lowercase() == lower || s.aliases().contains(&lower.as_str()))
            .unwrap_or(FinanceServiceType::Unknown)
    }
}

// ============================================================================
// PAYMENT METHOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    Cash,
    Cryptocurrency,
    Unknown,
}

impl PaymentMethod {
    const KNOWN: [PaymentMethod; 4] = [
        PaymentMethod::BankTransfer,
        PaymentMethod::CreditCard,
        PaymentMethod::Cash,
        PaymentMethod::Cryptocurrency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "Bank transfer",
            PaymentMethod::CreditCard => "Credit card",
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Cryptocurrency => "Cryptocurrency",
            PaymentMethod::Unknown => "Unknown",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            PaymentMethod::BankTransfer => &["банковский перевод", "wire transfer"],
            PaymentMethod::CreditCard => &["кредитная карта", "card"],
            PaymentMethod::Cash => &["наличные"],
            PaymentMethod::Cryptocurrency => &["криптовалюта", "crypto"],
            PaymentMethod::Unknown => &[],
        }
    }

    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|m| m.as_str().to_lowercase() == lower || m.aliases().contains(&lower.as_str()))
            .unwrap_or(PaymentMethod::Unknown)
    }
}

// ============================================================================
// NORMALISATION HELPERS
// ============================================================================

/// Collapse whitespace runs; empty and "unknown"-style phrasings become `None`.
pub fn clean_free_text(value: Option<&str>) -> Option<String> {
    let cleaned = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() || UNKNOWN_PHRASES.contains(&cleaned.to_lowercase().as_str()) {
        return None;
    }
    Some(cleaned)
}

/// Parse a transaction timestamp; unparsable input (including the
/// `INVALID_DATE` marker) yields `None`.
pub fn parse_transaction_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "INVALID_DATE" {
        return None;
    }

    ACCEPTED_DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ============================================================================
// TRANSACTION ENTITY
// ============================================================================

/// Transaction value object. Built once by a loader, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<String>,
    /// Optional reference; the referenced client may not exist (orphan)
    pub client_id: Option<String>,
    pub transaction_date: Option<NaiveDateTime>,
    pub raw_service: String,
    pub raw_payment_method: String,
    /// Rounded half-up to cents on construction
    pub amount: f64,
    pub city: Option<String>,
    pub consultant: Option<String>,
}

impl Transaction {
    pub fn new(id: Option<String>, amount: f64) -> Self {
        Transaction {
            id,
            client_id: None,
            transaction_date: None,
            raw_service: String::new(),
            raw_payment_method: String::new(),
            amount: round_half_up(amount),
            city: None,
            consultant: None,
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDateTime) -> Self {
        self.transaction_date = Some(date);
        self
    }

    pub fn with_service(mut self, raw_service: impl Into<String>) -> Self {
        self.raw_service = raw_service.into().trim().to_string();
        self
    }

    pub fn with_payment_method(mut self, raw_payment_method: impl Into<String>) -> Self {
        self.raw_payment_method = raw_payment_method.into().trim().to_string();
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = clean_free_text(Some(city));
        self
    }

    pub fn with_consultant(mut self, consultant: &str) -> Self {
        self.consultant = clean_free_text(Some(consultant));
        self
    }

    pub fn service_category(&self) -> FinanceServiceType {
        FinanceServiceType::from_label(&self.raw_service)
    }

    pub fn payment_method_category(&self) -> PaymentMethod {
        PaymentMethod::from_label(&self.raw_payment_method)
    }

    pub fn has_id(&self) -> bool {
        self.id.as_deref().map_or(false, |id| !id.is_empty())
    }
}
