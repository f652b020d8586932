// 💰 Money - monetary value rounded half-up to cents
//
// f64 amounts arrive from loaders; they are rounded through a decimal
// representation so that 99.995 becomes 100.00 rather than 99.99.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Round a float to two decimals, ties away from zero.
///
/// Uses the shortest decimal representation of `value` (what `Display`
/// prints), so binary artefacts such as `99.99499999…` do not leak into the
/// rounding. Non-finite values are returned unchanged.
pub fn round_half_up(value: f64) -> f64 {
    round_to(value, 2)
}

/// Round a float to `dp` decimals, ties away from zero.
pub fn round_to(value: f64, dp: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    match Decimal::from_str(&value.to_string()) {
        Ok(decimal) => decimal
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
            .unwrap_or(value),
        // Outside Decimal's range (~7.9e28); nothing meaningful to round
        Err(_) => value,
    }
}

/// Non-negative amount with exactly two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Build from a float. Fails on negative or non-finite input.
    pub fn from_f64(amount: f64) -> Result<Self, String> {
        if !amount.is_finite() {
            return Err(format!("Invalid amount format: {}", amount));
        }
        let decimal = Decimal::from_str(&amount.to_string())
            .map_err(|_| format!("Invalid amount format: {}", amount))?;
        Self::from_decimal(decimal)
    }

    /// Parse a textual amount; a lone comma is treated as the decimal mark.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let compact: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
        let normalized = if compact.contains(',') && !compact.contains('.') {
            compact.replace(',', ".")
        } else {
            compact.replace(',', "")
        };

        let decimal = Decimal::from_str(&normalized)
            .map_err(|_| format!("Invalid amount format: {}", raw))?;
        Self::from_decimal(decimal)
    }

    fn from_decimal(decimal: Decimal) -> Result<Self, String> {
        let rounded = decimal.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if rounded.is_sign_negative() && !rounded.is_zero() {
            return Err(format!("Amount cannot be negative: {}", decimal));
        }
        Ok(Money(rounded))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl fmt::Display for Money {
    /// `1234567.5` → `1,234,567.50`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = format!("{:.2}", self.0);
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        write!(f, "{}.{}", grouped, frac_part)
    }
}
