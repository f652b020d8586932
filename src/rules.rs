// 🚦 Validation Rules - gate-only predicates over one entity
// Each rule answers (is_valid, reason). Rules never mutate the entity; the
// cleaner composes them in a fixed order and stops at the first failure.

use crate::entities::{Client, FinanceServiceType, PaymentMethod, Transaction};
use chrono::{Datelike, Local, NaiveDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Amounts above this are accepted but logged as suspicious
pub const SUSPICIOUS_AMOUNT: f64 = 1_000_000_000_000.0;

/// Maximum length (in characters) for city and consultant names
pub const MAX_FREE_TEXT_LEN: usize = 100;

/// Earliest accepted transaction year
pub const MIN_TRANSACTION_YEAR: i32 = 2000;

// ============================================================================
// RULE VERDICT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl RuleVerdict {
    pub fn pass() -> Self {
        RuleVerdict {
            is_valid: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        RuleVerdict {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// RULE CAPABILITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Validation only; a failure drops the entity
    NonFixable,
    /// May produce a corrected copy through [`ValidationRule::fix`]
    Fixable,
}

pub trait ValidationRule<T>: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    fn validate(&self, entity: &T) -> RuleVerdict;

    fn kind(&self) -> RuleKind {
        RuleKind::NonFixable
    }

    /// Corrected copy of `entity`, if this rule knows how to build one.
    fn fix(&self, _entity: &T) -> Option<T> {
        None
    }
}

pub type BoxedRule<T> = Box<dyn ValidationRule<T>>;

fn check_uuid(id: Option<&str>, what: &str) -> RuleVerdict {
    match id {
        None | Some("") => RuleVerdict::fail(format!("Missing {} ID", what)),
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(_) => RuleVerdict::pass(),
            Err(_) => RuleVerdict::fail(format!("Invalid {} ID format: {}", what, raw)),
        },
    }
}

fn check_length(value: Option<&str>, field: &str) -> RuleVerdict {
    match value {
        Some(text) if text.chars().count() > MAX_FREE_TEXT_LEN => {
            RuleVerdict::fail(format!("{} name too long: {}", field, text))
        }
        _ => RuleVerdict::pass(),
    }
}

// ============================================================================
// TRANSACTION RULES
// ============================================================================

pub struct TransactionIdRule;

impl ValidationRule<Transaction> for TransactionIdRule {
    fn name(&self) -> &'static str {
        "transaction_id"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        check_uuid(entity.id.as_deref(), "transaction")
    }
}

/// Structural completeness: a reference must be present. Whether the client
/// actually exists is not checked here.
pub struct ClientReferenceRule;

impl ValidationRule<Transaction> for ClientReferenceRule {
    fn name(&self) -> &'static str {
        "client_reference"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        match entity.client_id.as_deref() {
            None | Some("") => RuleVerdict::fail("Missing client ID"),
            Some(_) => RuleVerdict::pass(),
        }
    }
}

/// Date must be present, not in the future and not before 2000.
pub struct TransactionDateRule {
    /// Fixed "now" for deterministic checks; wall clock when `None`
    reference_time: Option<NaiveDateTime>,
}

impl TransactionDateRule {
    pub fn new() -> Self {
        TransactionDateRule {
            reference_time: None,
        }
    }

    pub fn with_reference_time(reference_time: NaiveDateTime) -> Self {
        TransactionDateRule {
            reference_time: Some(reference_time),
        }
    }

    fn now(&self) -> NaiveDateTime {
        self.reference_time
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

impl Default for TransactionDateRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationRule<Transaction> for TransactionDateRule {
    fn name(&self) -> &'static str {
        "transaction_date"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        let Some(date) = entity.transaction_date else {
            return RuleVerdict::fail("Missing transaction date");
        };

        if date > self.now() {
            return RuleVerdict::fail(format!("Future date: {}", date));
        }

        if date.year() < MIN_TRANSACTION_YEAR {
            return RuleVerdict::fail(format!("Date too old: {}", date));
        }

        RuleVerdict::pass()
    }
}

pub struct AmountRule;

impl ValidationRule<Transaction> for AmountRule {
    fn name(&self) -> &'static str {
        "amount"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        // Negated comparison so NaN is rejected too
        if !(entity.amount > 0.0) {
            return RuleVerdict::fail(format!("Invalid amount: {}", entity.amount));
        }

        if entity.amount > SUSPICIOUS_AMOUNT {
            warn!(
                amount = entity.amount,
                transaction_id = ?entity.id,
                "Unusually large amount"
            );
        }

        RuleVerdict::pass()
    }
}

pub struct ServiceRule;

impl ValidationRule<Transaction> for ServiceRule {
    fn name(&self) -> &'static str {
        "service"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        if entity.raw_service.trim().is_empty() {
            return RuleVerdict::fail("Missing service type");
        }

        if entity.service_category() == FinanceServiceType::Unknown {
            debug!(raw_service = %entity.raw_service, "Unknown service type");
        }

        RuleVerdict::pass()
    }
}

pub struct PaymentMethodRule;

impl ValidationRule<Transaction> for PaymentMethodRule {
    fn name(&self) -> &'static str {
        "payment_method"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        if entity.raw_payment_method.trim().is_empty() {
            return RuleVerdict::fail("Missing payment method");
        }

        if entity.payment_method_category() == PaymentMethod::Unknown {
            debug!(raw_payment_method = %entity.raw_payment_method, "Unknown payment method");
        }

        RuleVerdict::pass()
    }
}

pub struct CityRule;

impl ValidationRule<Transaction> for CityRule {
    fn name(&self) -> &'static str {
        "city"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        check_length(entity.city.as_deref(), "City")
    }
}

pub struct ConsultantRule;

impl ValidationRule<Transaction> for ConsultantRule {
    fn name(&self) -> &'static str {
        "consultant"
    }

    fn validate(&self, entity: &Transaction) -> RuleVerdict {
        check_length(entity.consultant.as_deref(), "Consultant")
    }
}

/// Default transaction chain, in evaluation order.
pub fn default_transaction_rules() -> Vec<BoxedRule<Transaction>> {
    vec![
        Box::new(TransactionIdRule),
        Box::new(ClientReferenceRule),
        Box::new(TransactionDateRule::new()),
        Box::new(AmountRule),
        Box::new(ServiceRule),
        Box::new(PaymentMethodRule),
        Box::new(CityRule),
        Box::new(ConsultantRule),
    ]
}

// ============================================================================
// CLIENT RULES
// ============================================================================

pub struct ClientIdRule;

impl ValidationRule<Client> for ClientIdRule {
    fn name(&self) -> &'static str {
        "client_id"
    }

    fn validate(&self, entity: &Client) -> RuleVerdict {
        check_uuid(entity.id.as_deref(), "client")
    }
}

pub struct ClientAgeRule;

impl ValidationRule<Client> for ClientAgeRule {
    fn name(&self) -> &'static str {
        "client_age"
    }

    fn validate(&self, entity: &Client) -> RuleVerdict {
        match entity.age {
            Some(age) if !(0..=150).contains(&age) => {
                RuleVerdict::fail(format!("Invalid age: {}", age))
            }
            _ => RuleVerdict::pass(),
        }
    }
}

/// Any gender value is accepted, including `Unknown`.
pub struct ClientGenderRule;

impl ValidationRule<Client> for ClientGenderRule {
    fn name(&self) -> &'static str {
        "client_gender"
    }

    fn validate(&self, _entity: &Client) -> RuleVerdict {
        RuleVerdict::pass()
    }
}

pub struct ClientNetWorthRule;

impl ValidationRule<Client> for ClientNetWorthRule {
    fn name(&self) -> &'static str {
        "client_net_worth"
    }

    fn validate(&self, entity: &Client) -> RuleVerdict {
        match entity.net_worth {
            Some(net_worth) if !(net_worth >= 0.0) => {
                RuleVerdict::fail(format!("Negative net worth: {}", net_worth))
            }
            _ => RuleVerdict::pass(),
        }
    }
}

/// Default client chain, in evaluation order.
pub fn default_client_rules() -> Vec<BoxedRule<Client>> {
    vec![
        Box::new(ClientIdRule),
        Box::new(ClientAgeRule),
        Box::new(ClientGenderRule),
        Box::new(ClientNetWorthRule),
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn valid_transaction() -> Transaction {
        Transaction::new(Some(Uuid::new_v4().to_string()), 150.0)
            .with_client(Uuid::new_v4().to_string())
            .with_date(at(2024, 5, 1))
            .with_service("Tax planning")
            .with_payment_method("Cash")
            .with_city("Moscow")
    }

    #[test]
    fn test_all_default_rules_pass_valid_transaction() {
        let tx = valid_transaction();
        for rule in default_transaction_rules() {
            let verdict = rule.validate(&tx);
            assert!(verdict.is_valid, "{} should pass: {:?}", rule.name(), verdict.reason);
        }
    }

    #[test]
    fn test_transaction_id_rule() {
        let mut tx = valid_transaction();
        tx.id = None;
        assert_eq!(
            TransactionIdRule.validate(&tx),
            RuleVerdict::fail("Missing transaction ID")
        );

        tx.id = Some("not-a-uuid".to_string());
        let verdict = TransactionIdRule.validate(&tx);
        assert!(!verdict.is_valid);
        assert!(verdict.reason.unwrap().contains("not-a-uuid"));
    }

    #[test]
    fn test_client_reference_rule_rejects_missing() {
        let mut tx = valid_transaction();
        tx.client_id = None;
        assert!(!ClientReferenceRule.validate(&tx).is_valid);
    }

    #[test]
    fn test_date_rule_bounds() {
        let rule = TransactionDateRule::with_reference_time(at(2024, 6, 1));

        let tx = valid_transaction().with_date(at(2024, 6, 2));
        assert!(rule.validate(&tx).reason.unwrap().starts_with("Future date"));

        let tx = valid_transaction().with_date(at(1999, 12, 31));
        assert!(rule.validate(&tx).reason.unwrap().starts_with("Date too old"));

        let tx = valid_transaction().with_date(at(2000, 1, 1));
        assert!(rule.validate(&tx).is_valid);

        let mut tx = valid_transaction();
        tx.transaction_date = None;
        assert!(!rule.validate(&tx).is_valid);
    }

    #[test]
    fn test_amount_rule() {
        assert!(!AmountRule.validate(&Transaction::new(None, 0.0)).is_valid);
        assert!(!AmountRule.validate(&Transaction::new(None, -5.0)).is_valid);
        assert!(!AmountRule.validate(&Transaction::new(None, f64::NAN)).is_valid);
        // Suspicious but accepted
        assert!(AmountRule.validate(&Transaction::new(None, 2e12)).is_valid);
    }

    #[test]
    fn test_unknown_service_and_payment_are_accepted() {
        let tx = valid_transaction()
            .with_service("Astrology")
            .with_payment_method("Barter");
        assert!(ServiceRule.validate(&tx).is_valid);
        assert!(PaymentMethodRule.validate(&tx).is_valid);
    }

    #[test]
    fn test_empty_service_and_payment_are_rejected() {
        let tx = valid_transaction().with_service("  ");
        assert!(!ServiceRule.validate(&tx).is_valid);

        let tx = valid_transaction().with_payment_method("");
        assert!(!PaymentMethodRule.validate(&tx).is_valid);
    }

    #[test]
    fn test_free_text_length_rules() {
        let tx = valid_transaction().with_city(&"a".repeat(101));
        assert!(!CityRule.validate(&tx).is_valid);

        let tx = valid_transaction().with_consultant(&"б".repeat(100));
        assert!(ConsultantRule.validate(&tx).is_valid);

        let mut tx = valid_transaction();
        tx.city = None;
        assert!(CityRule.validate(&tx).is_valid);
    }

    #[test]
    fn test_client_rules() {
        let id = Some(Uuid::new_v4().to_string());

        assert!(ClientIdRule.validate(&Client::new(id.clone())).is_valid);
        assert!(!ClientIdRule.validate(&Client::new(None)).is_valid);
        assert!(!ClientIdRule.validate(&Client::new(Some("42".to_string()))).is_valid);

        assert!(ClientAgeRule.validate(&Client::new(id.clone()).with_age(150)).is_valid);
        assert!(!ClientAgeRule.validate(&Client::new(id.clone()).with_age(151)).is_valid);
        assert!(!ClientAgeRule.validate(&Client::new(id.clone()).with_age(-1)).is_valid);
        assert!(ClientAgeRule.validate(&Client::new(id.clone())).is_valid);

        assert!(!ClientNetWorthRule
            .validate(&Client::new(id.clone()).with_net_worth(-10.0))
            .is_valid);
        assert!(ClientNetWorthRule
            .validate(&Client::new(id.clone()).with_net_worth(0.0))
            .is_valid);

        assert!(ClientGenderRule.validate(&Client::new(None)).is_valid);
    }

    #[test]
    fn test_default_rules_are_non_fixable() {
        assert!(default_transaction_rules()
            .iter()
            .all(|r| r.kind() == RuleKind::NonFixable));
        assert!(default_client_rules()
            .iter()
            .all(|r| r.kind() == RuleKind::NonFixable));
    }
}
