//! Currency codes and minor-unit amount formatting.
//!
//! Amounts travel through the pipeline as integers in the currency's minor
//! unit, exactly as the payment provider sends them. Conversion into a
//! human readable major-unit string happens only at presentation time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currencies whose minor unit equals the display unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// Error returned for a string that is not an ISO-4217 style code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid currency code: {0:?}")]
pub struct InvalidCurrency(pub String);

/// Three-letter ISO-4217 currency code, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a currency code, accepting any letter case.
    pub fn parse(code: &str) -> Result<Self, InvalidCurrency> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(InvalidCurrency(code.to_string()))
        }
    }

    /// Returns the lowercase code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when amounts in this currency are not divided by 100.
    pub fn is_zero_decimal(&self) -> bool {
        ZERO_DECIMAL_CURRENCIES.contains(&self.0.as_str())
    }

    /// Formats a minor-unit amount for display, e.g. `"15.00 USD"`.
    pub fn format_amount(&self, minor_units: i64) -> String {
        let code = self.0.to_ascii_uppercase();
        let sign = if minor_units < 0 { "-" } else { "" };
        let abs = minor_units.unsigned_abs();

        if self.is_zero_decimal() {
            format!("{sign}{} {code}", group_thousands(abs))
        } else {
            format!("{sign}{}.{:02} {code}", group_thousands(abs / 100), abs % 100)
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Formats a minor-unit amount given a raw currency code.
///
/// Unknown or malformed codes fall back to two decimal places and are
/// printed uppercased as given.
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    match Currency::parse(currency) {
        Ok(currency) => currency.format_amount(minor_units),
        Err(_) => {
            let sign = if minor_units < 0 { "-" } else { "" };
            let abs = minor_units.unsigned_abs();
            format!(
                "{sign}{}.{:02} {}",
                group_thousands(abs / 100),
                abs % 100,
                currency.to_ascii_uppercase()
            )
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
