// 🧹 Cleaner - runs an ordered rule chain over each entity
//
// All-or-nothing: the first failing rule drops the entity (logged at debug
// level, never raised). A batch is never aborted by a bad record.

use crate::entities::{Client, Transaction};
use crate::rules::{default_client_rules, default_transaction_rules, BoxedRule, RuleKind};
use std::fmt::Debug;
use tracing::debug;

/// Entities the cleaner can name in its logs
pub trait Identified {
    fn entity_type() -> &'static str;
    fn identity(&self) -> Option<&str>;
}

impl Identified for Transaction {
    fn entity_type() -> &'static str {
        "transaction"
    }

    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Identified for Client {
    fn entity_type() -> &'static str {
        "client"
    }

    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    pub accepted: usize,
    pub skipped: usize,
}

// ============================================================================
// CLEANER
// ============================================================================

pub struct Cleaner<T> {
    rules: Vec<BoxedRule<T>>,
}

pub type TransactionCleaner = Cleaner<Transaction>;
pub type ClientCleaner = Cleaner<Client>;

impl Cleaner<Transaction> {
    pub fn new() -> Self {
        Cleaner::with_rules(default_transaction_rules())
    }
}

impl Default for Cleaner<Transaction> {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner<Client> {
    pub fn new() -> Self {
        Cleaner::with_rules(default_client_rules())
    }
}

impl Default for Cleaner<Client> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identified + Debug> Cleaner<T> {
    /// Cleaner with a custom chain; rules run in the given order.
    pub fn with_rules(rules: Vec<BoxedRule<T>>) -> Self {
        Cleaner { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Accepted entity, or `None` when a rule rejects it.
    ///
    /// A failing `Fixable` rule gets one chance to supply a corrected copy;
    /// the copy must then satisfy that rule, and the chain continues with it.
    pub fn clean(&self, entity: T) -> Option<T> {
        let mut current = entity;

        for rule in &self.rules {
            let verdict = rule.validate(&current);
            if verdict.is_valid {
                continue;
            }

            if rule.kind() == RuleKind::Fixable {
                if let Some(fixed) = rule.fix(&current) {
                    if rule.validate(&fixed).is_valid {
                        debug!(
                            entity = T::entity_type(),
                            id = ?fixed.identity(),
                            rule = rule.name(),
                            "Entity fixed"
                        );
                        current = fixed;
                        continue;
                    }
                }
            }

            debug!(
                entity = T::entity_type(),
                id = ?current.identity(),
                rule = rule.name(),
                reason = verdict.reason.as_deref().unwrap_or(""),
                "Entity failed validation"
            );
            return None;
        }

        Some(current)
    }

    /// Clean every item, dropping rejects and keeping order.
    pub fn clean_batch<I>(&self, entities: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        self.clean_batch_with_stats(entities).0
    }

    pub fn clean_batch_with_stats<I>(&self, entities: I) -> (Vec<T>, CleaningStats)
    where
        I: IntoIterator<Item = T>,
    {
        let mut stats = CleaningStats::default();
        let cleaned = entities
            .into_iter()
            .filter_map(|entity| {
                let result = self.clean(entity);
                match result {
                    Some(_) => stats.accepted += 1,
                    None => stats.skipped += 1,
                }
                result
            })
            .collect();

        (cleaned, stats)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleVerdict, ValidationRule};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn valid_transaction(amount: f64) -> Transaction {
        Transaction::new(Some(Uuid::new_v4().to_string()), amount)
            .with_client(Uuid::new_v4().to_string())
            .with_date(
                NaiveDate::from_ymd_opt(2024, 2, 10)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
            )
            .with_service("Financial planning")
            .with_payment_method("Bank transfer")
    }

    #[test]
    fn test_clean_accepts_valid_amounts_rounded() {
        let cleaner = TransactionCleaner::new();

        for amount in [0.01, 1.0, 99.995, 1234.567, 5e11] {
            let cleaned = cleaner.clean(valid_transaction(amount)).unwrap();
            assert_eq!(cleaned.amount, crate::entities::round_half_up(amount));
        }
    }

    #[test]
    fn test_clean_skips_non_positive_amounts() {
        let cleaner = TransactionCleaner::new();

        for amount in [0.0, -0.01, -100.0, 0.004] {
            assert!(cleaner.clean(valid_transaction(amount)).is_none());
        }
    }

    #[test]
    fn test_first_failure_short_circuits() {
        struct Counting(std::sync::Arc<std::sync::atomic::AtomicUsize>);

        impl ValidationRule<Transaction> for Counting {
            fn name(&self) -> &'static str {
                "counting"
            }

            fn validate(&self, _entity: &Transaction) -> RuleVerdict {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                RuleVerdict::pass()
            }
        }

        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cleaner = TransactionCleaner::with_rules(vec![
            Box::new(crate::rules::TransactionIdRule),
            Box::new(Counting(calls.clone())),
        ]);

        let mut tx = valid_transaction(10.0);
        tx.id = None;
        assert!(cleaner.clean(tx).is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        assert!(cleaner.clean(valid_transaction(10.0)).is_some());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fixable_rule_supplies_correction() {
        struct DefaultCity;

        impl ValidationRule<Transaction> for DefaultCity {
            fn name(&self) -> &'static str {
                "default_city"
            }

            fn validate(&self, entity: &Transaction) -> RuleVerdict {
                if entity.city.is_some() {
                    RuleVerdict::pass()
                } else {
                    RuleVerdict::fail("Missing city")
                }
            }

            fn kind(&self) -> RuleKind {
                RuleKind::Fixable
            }

            fn fix(&self, entity: &Transaction) -> Option<Transaction> {
                Some(entity.clone().with_city("Head office"))
            }
        }

        let cleaner = TransactionCleaner::with_rules(vec![Box::new(DefaultCity)]);
        let cleaned = cleaner.clean(valid_transaction(10.0)).unwrap();
        assert_eq!(cleaned.city.as_deref(), Some("Head office"));
    }

    #[test]
    fn test_clean_batch_preserves_order() {
        let cleaner = TransactionCleaner::new();
        let batch = vec![
            valid_transaction(1.0),
            valid_transaction(-1.0),
            valid_transaction(2.0),
            valid_transaction(3.0),
        ];

        let (cleaned, stats) = cleaner.clean_batch_with_stats(batch);
        let amounts: Vec<f64> = cleaned.iter().map(|t| t.amount).collect();

        assert_eq!(amounts, vec![1.0, 2.0, 3.0]);
        assert_eq!(stats, CleaningStats { accepted: 3, skipped: 1 });
    }

    #[test]
    fn test_client_cleaner_default_chain() {
        let cleaner = ClientCleaner::new();
        assert_eq!(
            cleaner.rule_names(),
            vec!["client_id", "client_age", "client_gender", "client_net_worth"]
        );

        let good = Client::new(Some(Uuid::new_v4().to_string())).with_age(30);
        let bad = Client::new(Some(Uuid::new_v4().to_string())).with_net_worth(-1.0);

        assert_eq!(cleaner.clean_batch(vec![good.clone(), bad]), vec![good]);
    }
}
