//! Money

use rust_decimal::{Decimal, prelude::ToPrimitive};
use rusty_money::{Money, iso};
use thiserror::Error;

/// Minor units (paise) in one major unit (rupee).
pub const MINOR_PER_MAJOR: u64 = 100;

/// Errors raised by amount arithmetic.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    /// An amount exceeded the representable range.
    #[error("amount overflowed")]
    Overflow,
}

/// Price of `quantity` units at `unit_price`.
///
/// # Errors
///
/// Returns [`MoneyError::Overflow`] when the product does not fit in `u64`.
pub fn line_total(unit_price: u64, quantity: u32) -> Result<u64, MoneyError> {
    unit_price
        .checked_mul(u64::from(quantity))
        .ok_or(MoneyError::Overflow)
}

/// Sum a sequence of amounts.
///
/// # Errors
///
/// Returns [`MoneyError::Overflow`] when the sum does not fit in `u64`.
pub fn checked_sum(amounts: impl IntoIterator<Item = u64>) -> Result<u64, MoneyError> {
    amounts
        .into_iter()
        .try_fold(0_u64, |acc, amount| acc.checked_add(amount))
        .ok_or(MoneyError::Overflow)
}

/// `percent`% of `amount`, rounded down to the minor unit.
///
/// The percentage is clamped to `0..=100`, so the result never exceeds `amount`.
pub fn percentage_of(amount: u64, percent: Decimal) -> u64 {
    let percent = percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);

    Decimal::from(amount)
        .checked_mul(percent)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|value| value.floor().to_u64())
        .map_or(amount, |value| value.min(amount))
}

/// Whole major units contained in `minor`, rounded down.
pub const fn whole_major_units(minor: u64) -> u64 {
    minor / MINOR_PER_MAJOR
}

/// Human readable rupee amount, e.g. `₹950.00`.
///
/// Amounts beyond `i64::MAX` minor units are rendered as raw paise.
pub fn format_amount(minor: u64) -> String {
    match i64::try_from(minor) {
        Ok(minor) => Money::from_minor(minor, iso::INR).to_string(),
        Err(_) => format!("{minor} paise"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_multiplies_quantity() {
        assert_eq!(line_total(500_00, 2), Ok(1_000_00));
        assert_eq!(line_total(u64::MAX, 2), Err(MoneyError::Overflow));
    }

    #[test]
    fn percentage_rounds_down() {
        assert_eq!(percentage_of(1_000_00, Decimal::from(10)), 100_00);
        assert_eq!(percentage_of(999, Decimal::from(10)), 99);
        assert_eq!(percentage_of(1_000, Decimal::new(125, 1)), 125);
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(percentage_of(1_000, Decimal::from(150)), 1_000);
        assert_eq!(percentage_of(1_000, Decimal::from(-5)), 0);
    }

    #[test]
    fn checked_sum_detects_overflow() {
        assert_eq!(checked_sum([1, 2, 3]), Ok(6));
        assert_eq!(checked_sum([u64::MAX, 1]), Err(MoneyError::Overflow));
    }

    #[test]
    fn formats_rupees() {
        let formatted = format_amount(950_00);

        assert!(formatted.contains("950"), "unexpected format: {formatted}");
    }
}
