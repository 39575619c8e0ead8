//! Utility functions for x402 operations.
//!
//! Conversions between human amounts and atomic token units. All conversions go through
//! [`rust_decimal::Decimal`] and round down.

use crate::errors::{Result, X402Error};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Largest number of decimals a [`Decimal`] can scale by.
const MAX_DECIMALS: u8 = 28;

fn pow10(decimals: u8) -> Result<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(X402Error::InvalidAmount(format!(
            "unsupported token decimals {decimals}"
        )));
    }
    Ok(Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0))
}

/// Converts a decimal amount to atomic units, rounding down.
pub fn decimal_to_atomic(amount: Decimal, decimals: u8) -> Result<u64> {
    if amount.is_sign_negative() {
        return Err(X402Error::InvalidAmount(format!("{amount} is negative")));
    }
    amount
        .checked_mul(pow10(decimals)?)
        .and_then(|scaled| scaled.floor().to_u64())
        .ok_or_else(|| X402Error::InvalidAmount(format!("{amount} overflows atomic units")))
}

/// Converts a human amount to atomic units as a decimal string, rounding down.
///
/// # Examples
///
/// ```
/// use x402_solana::utils::to_atomic;
///
/// assert_eq!(to_atomic(2.5, 6).unwrap(), "2500000");
/// assert_eq!(to_atomic(0.0000001, 6).unwrap(), "0");
/// ```
pub fn to_atomic(amount: f64, decimals: u8) -> Result<String> {
    if !amount.is_finite() {
        return Err(X402Error::InvalidAmount(format!("{amount} is not finite")));
    }
    // Display yields the shortest representation that round-trips, never an exponent.
    let decimal = Decimal::from_str(&amount.to_string())
        .map_err(|e| X402Error::InvalidAmount(format!("{amount}: {e}")))?;
    Ok(decimal_to_atomic(decimal, decimals)?.to_string())
}

/// Converts an atomic amount back to a human amount.
///
/// # Examples
///
/// ```
/// use x402_solana::utils::from_atomic;
///
/// assert_eq!(from_atomic("2500000", 6).unwrap(), 2.5);
/// ```
pub fn from_atomic(amount: &str, decimals: u8) -> Result<f64> {
    let atomic = Decimal::from_str(amount.trim())
        .map_err(|e| X402Error::InvalidAmount(format!("{amount}: {e}")))?;
    (atomic / pow10(decimals)?)
        .to_f64()
        .ok_or_else(|| X402Error::InvalidAmount(amount.to_string()))
}

/// Parses a money string such as `"$0.01"` or `"1,000.50"`.
pub fn parse_money(input: &str) -> Result<Decimal> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let parsed = Decimal::from_str(&cleaned)
        .map_err(|_| X402Error::InvalidAmount(format!("invalid money amount: {input}")))?;
    if parsed.is_sign_negative() {
        return Err(X402Error::InvalidAmount(format!("{input} is negative")));
    }
    Ok(parsed)
}

/// Parses a money string and converts it to atomic units of a token with `decimals`.
///
/// # Examples
///
/// ```
/// use x402_solana::utils::money_to_atomic;
///
/// assert_eq!(money_to_atomic("$0.01", 6).unwrap(), 10_000);
/// ```
pub fn money_to_atomic(input: &str, decimals: u8) -> Result<u64> {
    decimal_to_atomic(parse_money(input)?, decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_atomic_floors() {
        assert_eq!(to_atomic(2.5, 6).unwrap(), "2500000");
        assert_eq!(to_atomic(0.0000001, 6).unwrap(), "0");
        assert_eq!(to_atomic(0.0000019, 6).unwrap(), "1");
        assert_eq!(to_atomic(0.29, 6).unwrap(), "290000");
        assert_eq!(to_atomic(1.0, 0).unwrap(), "1");
    }

    #[test]
    fn test_to_atomic_rejects_bad_input() {
        assert!(to_atomic(-1.0, 6).is_err());
        assert!(to_atomic(f64::NAN, 6).is_err());
        assert!(to_atomic(f64::INFINITY, 6).is_err());
        assert!(to_atomic(1.0, 40).is_err());
    }

    #[test]
    fn test_from_atomic() {
        assert_eq!(from_atomic("2500000", 6).unwrap(), 2.5);
        assert_eq!(from_atomic("1", 9).unwrap(), 0.000000001);
        assert!(from_atomic("abc", 6).is_err());
    }

    #[test]
    fn test_conversion_stays_within_one_unit() {
        for (amount, decimals) in [(0.123456789, 6), (19.99, 2), (1234.5678, 9), (0.01, 6)] {
            let atomic = to_atomic(amount, decimals).unwrap();
            let back = from_atomic(&atomic, decimals).unwrap();
            let unit = 10f64.powi(-(decimals as i32));
            assert!(amount - back >= -1e-12 && amount - back < unit + 1e-12);
        }
    }

    #[test]
    fn test_money_strings() {
        assert_eq!(money_to_atomic("$0.01", 6).unwrap(), 10_000);
        assert_eq!(money_to_atomic("1,000.50", 6).unwrap(), 1_000_500_000);
        assert_eq!(money_to_atomic("0.0000009", 6).unwrap(), 0);
        assert!(money_to_atomic("-$1", 6).is_err());
        assert!(money_to_atomic("free", 6).is_err());
    }
}
