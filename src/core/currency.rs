use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision used when neither the tenant nor the built-in table knows a currency
pub const DEFAULT_SCALE: u32 = 2;

/// ISO 4217 currency code (three uppercase ASCII letters)
///
/// Settlement currency is fixed per enrollment; no conversion is ever performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Built-in decimal precision for well-known currencies
    /// - zero-decimal: IDR, JPY, KRW, VND, CLP, ISK
    /// - three-decimal: BHD, KWD, OMR, JOD, TND
    /// - everything else: 2
    pub fn default_scale(&self) -> u32 {
        match self.0.as_str() {
            "IDR" | "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => DEFAULT_SCALE,
        }
    }
}

/// Rounds to the given precision, midpoint away from zero
pub fn round_to_scale(amount: Decimal, scale: u32) -> Decimal {
    amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncates towards zero at the given precision
pub fn round_down_to_scale(amount: Decimal, scale: u32) -> Decimal {
    amount.round_dp_with_strategy(scale, RoundingStrategy::ToZero)
}

/// Smallest representable unit at the given precision (1, 0.01, 0.001, ...)
pub fn smallest_unit(scale: u32) -> Decimal {
    Decimal::new(1, scale)
}

/// Validates that a positive amount carries no more decimals than the currency allows
pub fn validate_amount(amount: Decimal, currency: &Currency, scale: u32) -> Result<(), String> {
    if amount <= Decimal::ZERO {
        return Err(format!("{} amount must be positive, got {}", currency, amount));
    }

    if amount.normalize().scale() > scale {
        return Err(format!(
            "{} amounts must have at most {} decimal places, got {}",
            currency, scale, amount
        ));
    }

    Ok(())
}

/// Formats an amount for display with the currency's decimal places
pub fn format_amount(amount: Decimal, currency: &Currency, scale: u32) -> String {
    format!(
        "{} {:.width$}",
        currency,
        round_to_scale(amount, scale),
        width = scale as usize
    )
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(format!("Invalid currency: {}", s));
        }
        Ok(Currency(code))
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Currency {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}
