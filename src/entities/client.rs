// 👤 Client Entity - customer with optional demographic data
//
// Identity is the client UUID (kept as text so the cleaning rules can check
// its shape). Net-worth segment is derived, never stored.

use crate::entities::money::round_half_up;
use serde::{Deserialize, Serialize};

// ============================================================================
// GENDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
            Gender::Unknown => "Unknown",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Gender::Male => &["male", "m", "мужчина"],
            Gender::Female => &["female", "f", "женщина"],
            Gender::Other => &["other", "другой"],
            Gender::Unknown => &["unknown", "не указан"],
        }
    }

    /// Map a free-text label to a gender; anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        [Gender::Male, Gender::Female, Gender::Other]
            .into_iter()
            .find(|g| g.aliases().contains(&lower.as_str()))
            .unwrap_or(Gender::Unknown)
    }
}

// ============================================================================
// NET WORTH LEVEL
// ============================================================================

pub const LOW_NET_WORTH_CEILING: f64 = 100_000.0;
pub const HIGH_NET_WORTH_FLOOR: f64 = 1_000_000.0;

/// Segment code used for clients whose net worth is unknown.
pub const UNKNOWN_SEGMENT: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetWorthLevel {
    Low,
    Medium,
    High,
}

impl NetWorthLevel {
    /// `< 100k` LOW, `[100k, 1M]` MEDIUM, `> 1M` HIGH.
    pub fn from_amount(amount: f64) -> Self {
        if amount < LOW_NET_WORTH_CEILING {
            NetWorthLevel::Low
        } else if amount <= HIGH_NET_WORTH_FLOOR {
            NetWorthLevel::Medium
        } else {
            NetWorthLevel::High
        }
    }

    /// Stable code, also used as the segment key in SQL aggregations
    pub fn code(&self) -> &'static str {
        match self {
            NetWorthLevel::Low => "LOW",
            NetWorthLevel::Medium => "MEDIUM",
            NetWorthLevel::High => "HIGH",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NetWorthLevel::Low => "Low net worth",
            NetWorthLevel::Medium => "Medium net worth",
            NetWorthLevel::High => "High net worth",
        }
    }

    pub fn all() -> [NetWorthLevel; 3] {
        [NetWorthLevel::Low, NetWorthLevel::Medium, NetWorthLevel::High]
    }
}

// ============================================================================
// CLIENT ENTITY
// ============================================================================

/// Client value object. Built once by a loader, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Option<String>,
    pub age: Option<i64>,
    pub gender: Gender,
    /// Rounded to cents on construction
    pub net_worth: Option<f64>,
}

impl Client {
    pub fn new(id: Option<String>) -> Self {
        Client {
            id,
            age: None,
            gender: Gender::Unknown,
            net_worth: None,
        }
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = gender;
        self
    }

    pub fn with_net_worth(mut self, net_worth: f64) -> Self {
        self.net_worth = Some(round_half_up(net_worth));
        self
    }

    /// Derived segment; `None` when net worth is unknown.
    pub fn net_worth_level(&self) -> Option<NetWorthLevel> {
        self.net_worth.map(NetWorthLevel::from_amount)
    }

    pub fn has_id(&self) -> bool {
        self.id.as_deref().map_or(false, |id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_worth_boundaries() {
        assert_eq!(NetWorthLevel::from_amount(0.0), NetWorthLevel::Low);
        assert_eq!(NetWorthLevel::from_amount(99_999.99), NetWorthLevel::Low);
        assert_eq!(NetWorthLevel::from_amount(100_000.0), NetWorthLevel::Medium);
        assert_eq!(NetWorthLevel::from_amount(1_000_000.0), NetWorthLevel::Medium);
        assert_eq!(NetWorthLevel::from_amount(1_000_000.01), NetWorthLevel::High);
    }

    #[test]
    fn test_client_without_net_worth_has_no_segment() {
        let client = Client::new(Some("c1".to_string())).with_age(40);
        assert_eq!(client.net_worth_level(), None);
    }

    #[test]
    fn test_client_net_worth_rounded() {
        let client = Client::new(None).with_net_worth(2_514_729.455);
        assert_eq!(client.net_worth, Some(2_514_729.46));
        assert_eq!(client.net_worth_level(), Some(NetWorthLevel::High));
        assert!(!client.has_id());
    }

    #[test]
    fn test_gender_from_label() {
        assert_eq!(Gender::from_label("Male"), Gender::Male);
        assert_eq!(Gender::from_label("  FEMALE "), Gender::Female);
        assert_eq!(Gender::from_label("Мужчина"), Gender::Male);
        assert_eq!(Gender::from_label("Женщина"), Gender::Female);
        assert_eq!(Gender::from_label("Другой"), Gender::Other);
        assert_eq!(Gender::from_label("Не указан"), Gender::Unknown);
        assert_eq!(Gender::from_label("robot"), Gender::Unknown);
    }
}
