// Entity Models
//
// Clients and transactions are immutable value objects: loaders build them,
// cleaners gate them, repositories upsert them by identity.

pub mod client;
pub mod money;
pub mod transaction;

pub use client::{Client, Gender, NetWorthLevel, UNKNOWN_SEGMENT};
pub use money::{round_half_up, round_to, Money};
pub use transaction::{
    clean_free_text, parse_transaction_date, FinanceServiceType, PaymentMethod, Transaction,
    DATE_TIME_FORMAT,
};
