// 📚 Repositories - entity-to-table mapping and aggregation queries
//
// Every repository borrows one `Session` and must not outlive it. Reads see
// whatever the session's transaction sees; writes are upserts keyed by the
// entity's own identity.

pub mod analysis;
pub mod clients;
pub mod transactions;

pub use analysis::{AnalysisRecord, AnalysisRepository};
pub use clients::{ClientRepository, LevelRevenue, SegmentRevenue};
pub use transactions::{
    CityAverage, MonthlyRevenue, PaymentMethodShare, ServiceCount, ServicePerformance,
    ServiceRevenue, TransactionRepository,
};

use crate::entities::round_to;

/// Two-decimal half-up rounding applied to every monetary aggregate.
pub(crate) fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// `part / whole` as a percentage with two decimals; 0 when `whole` is 0.
pub(crate) fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        round2(part * 100.0 / whole)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::entities::{Client, Transaction};
    use chrono::{NaiveDate, NaiveDateTime};
    use uuid::Uuid;

    pub fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn transaction(
        client_id: &str,
        service: &str,
        amount: f64,
        date: NaiveDateTime,
    ) -> Transaction {
        Transaction::new(Some(new_id()), amount)
            .with_client(client_id)
            .with_service(service)
            .with_payment_method("Bank transfer")
            .with_date(date)
    }

    pub fn client(net_worth: Option<f64>) -> Client {
        let client = Client::new(Some(new_id())).with_age(40);
        match net_worth {
            Some(nw) => client.with_net_worth(nw),
            None => client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_guards_zero_total() {
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(1.0, 3.0), 33.33);
        assert_eq!(percentage(2.0, 3.0), 66.67);
    }
}
