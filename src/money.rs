use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Deserializer, Serialize};

/// An amount of money as an integer count of minor units (cents, fils, yen).
///
/// All balance arithmetic happens on this representation. The currency's
/// minor-unit exponent only matters when rendering, see [`Money::display_in`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn from_minor_units(value: i64) -> Self {
        Self(value)
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    /// Render at the currency's minor-unit exponent, e.g. `-12.34 USD`.
    pub fn display_in(self, currency: &Currency) -> String {
        let exponent = currency.minor_unit_exponent();
        if exponent == 0 {
            return format!("{} {}", self.0, currency);
        }
        let scale = 10u64.pow(exponent);
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        format!(
            "{}{}.{:0width$} {}",
            sign,
            magnitude / scale,
            magnitude % scale,
            currency,
            width = exponent as usize
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

/// Uppercase ISO 4217 currency code. Balances are kept per currency and the
/// engine never converts between currencies.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// How many decimal places the currency uses for display.
    pub fn minor_unit_exponent(&self) -> u32 {
        match self.0.as_str() {
            "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
            | "UGX" | "UYI" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
            "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Deserialized by hand so "usd" and "USD" never become two partitions.
impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Ok(Currency::new(&code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::dollars(1234, "USD", "12.34 USD")]
    #[case::negative(-50, "USD", "-0.50 USD")]
    #[case::sub_unit(7, "EUR", "0.07 EUR")]
    #[case::yen(1234, "JPY", "1234 JPY")]
    #[case::negative_yen(-1234, "JPY", "-1234 JPY")]
    #[case::dinar(12345, "BHD", "12.345 BHD")]
    #[case::unknown_code_defaults_to_cents(100, "XTS", "1.00 XTS")]
    fn formats_at_the_currency_exponent(
        #[case] minor_units: i64,
        #[case] code: &str,
        #[case] expected: &str,
    ) {
        let amount = Money::from_minor_units(minor_units);
        assert_eq!(amount.display_in(&Currency::new(code)), expected);
    }

    #[test]
    fn currency_codes_are_normalized() {
        assert_eq!(Currency::new("usd"), Currency::new("USD"));
        assert_eq!(Currency::new(" eur "), Currency::new("EUR"));
    }

    #[test]
    fn arithmetic_stays_in_minor_units() {
        let mut total = Money::from_minor_units(150) + Money::from_minor_units(-50);
        total -= Money::from_minor_units(100);
        assert!(total.is_zero());
        assert_eq!((-Money::from_minor_units(7)).minor_units(), -7);
        assert_eq!(Money::from_minor_units(-7).abs(), Money::from_minor_units(7));
    }

    #[test]
    fn deserializing_normalizes_the_code() {
        let currency: Currency = serde_json::from_str("\"chf\"").unwrap();
        assert_eq!(currency, Currency::new("CHF"));
    }
}
