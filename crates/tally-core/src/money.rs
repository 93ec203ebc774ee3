//! # Money Module
//!
//! Integer money, currency-aware rounding and sale-total arithmetic.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  0.1 + 0.2 = 0.30000000000000004  ❌ a ledger cannot drift like this    │
//! │                                                                         │
//! │  OUR SOLUTION: smallest currency unit as i64                            │
//! │    USD → cents        (1099 = $10.99)                                   │
//! │    IQD → dinars       (250 = 250 IQD, cash rounds to 250 steps)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::{Currency, Money};
//!
//! let price = Money::from_minor(1099);
//! let total = price.checked_mul(3).unwrap();
//! assert_eq!(total.minor(), 3297);
//! assert!(price.checked_mul(i64::MAX).is_none());
//!
//! // IQD totals are rounded UP to the next 250
//! assert_eq!(Currency::Iqd.round(1001), 1250);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::types::TaxRate;

/// Cash rounding step for Iraqi dinar totals.
pub const IQD_ROUNDING_STEP: i64 = 250;

// =============================================================================
// Currency
// =============================================================================

/// Currencies the store can price in.
///
/// Amounts are always stored in the currency's smallest unit. A stored
/// exchange rate on sales/purchases is informational only; no conversion
/// happens in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Currency {
    /// Iraqi dinar (base currency).
    #[default]
    Iqd,
    /// US dollar, in cents.
    Usd,
}

impl Currency {
    /// ISO 4217 code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Iqd => "IQD",
            Currency::Usd => "USD",
        }
    }

    /// Number of decimal places represented by the minor unit.
    pub const fn decimals(&self) -> u32 {
        match self {
            Currency::Iqd => 0,
            Currency::Usd => 2,
        }
    }

    /// Rounds an amount (already in minor units) for this currency.
    ///
    /// ## IQD
    /// Rounds up to the next multiple of 250 with a ceiling, so every
    /// non-multiple moves toward positive infinity:
    /// ```text
    ///   1     → 250
    ///   1001  → 1250
    ///   1250  → 1250
    ///  -300   → -250
    /// ```
    /// This biases totals upward. It is kept exactly as the store has always
    /// charged until the business confirms the rule.
    ///
    /// An amount within one step of `i64::MAX` has no multiple above it and
    /// stays at the largest multiple below; [`Currency::checked_round`]
    /// reports that case instead.
    ///
    /// ## USD
    /// Identity: cents are already the smallest payable unit.
    pub fn round(&self, amount: i64) -> i64 {
        self.checked_round(amount)
            .unwrap_or(i64::MAX - i64::MAX % IQD_ROUNDING_STEP)
    }

    /// Like [`Currency::round`], `None` when the rounded amount does not fit.
    pub fn checked_round(&self, amount: i64) -> Option<i64> {
        match self {
            Currency::Iqd => ceil_to_step(amount, IQD_ROUNDING_STEP),
            Currency::Usd => Some(amount),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IQD" => Ok(Currency::Iqd),
            "USD" => Ok(Currency::Usd),
            other => Err(ValidationError::InvalidFormat {
                field: "currency".to_string(),
                reason: format!("unsupported currency '{}'", other),
            }),
        }
    }
}

/// Ceiling of `amount` to a multiple of `step` (step > 0).
fn ceil_to_step(amount: i64, step: i64) -> Option<i64> {
    let quotient = amount / step;
    let remainder = amount % step;
    // Integer division truncates toward zero, which is already the ceiling
    // for negative amounts.
    let ceiled = if remainder > 0 { quotient + 1 } else { quotient };
    ceiled.checked_mul(step)
}

/// `unit_amount × quantity` for one document line.
///
/// ```rust
/// use tally_core::money::line_total;
///
/// assert_eq!(line_total(250, 4), Ok(1000));
/// assert!(line_total(4_000_000_000, 4_000_000_000).is_err());
/// ```
pub fn line_total(unit_amount: i64, quantity: i64) -> Result<i64, ValidationError> {
    unit_amount.checked_mul(quantity).ok_or_else(|| out_of_range("line_total"))
}

/// Sum of amounts, `OutOfRange` on `field` when it does not fit in i64.
pub fn checked_sum<I>(field: &str, amounts: I) -> Result<i64, ValidationError>
where
    I: IntoIterator<Item = i64>,
{
    amounts
        .into_iter()
        .try_fold(0i64, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| out_of_range(field))
}

fn out_of_range(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
}

/// Rounds an amount according to the given currency.
#[inline]
pub fn round_by_currency(amount: i64, currency: Currency) -> i64 {
    currency.round(amount)
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// - **i64 (signed)**: negative values for refunds and credit balances
/// - **Single field tuple struct**: zero-cost wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax at the given rate, rounding half up.
    ///
    /// Uses `(amount * bps + 5000) / 10000` on i128 to avoid overflow.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let tax = Money::from_minor(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.minor(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_minor(tax as i64)
    }

    /// Multiplies money by a quantity, `None` on overflow.
    #[inline]
    pub const fn checked_mul(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(amount) => Some(Money(amount)),
            None => None,
        }
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(amount) => Some(Money(amount)),
            None => None,
        }
    }

    /// Portion of this amount at `bps` basis points, rounding half up.
    pub fn percentage(&self, bps: u32) -> Money {
        let part = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money::from_minor(part as i64)
    }

    /// Rounds for the given currency.
    #[inline]
    pub fn round_for(&self, currency: Currency) -> Money {
        Money(currency.round(self.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Sale Totals
// =============================================================================

/// Discount applied to a whole sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
#[ts(export)]
pub enum Discount {
    #[default]
    None,
    /// Fixed amount in minor units.
    Fixed(i64),
    /// Percentage in basis points (1000 = 10%).
    Percentage(u32),
}

/// Computed totals for a sale.
///
/// ## Pipeline
/// ```text
/// Σ(unit_price × qty) ──► subtotal
///        │
///        ▼
///   − discount ──► + tax(bps on discounted) ──► round_by_currency ──► total
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleTotals {
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub total: i64,
}

impl SaleTotals {
    /// Computes totals from `(unit_price, quantity)` pairs.
    pub fn compute(
        lines: &[(i64, i64)],
        discount: Discount,
        tax_rate: TaxRate,
        currency: Currency,
    ) -> CoreResult<Self> {
        let line_totals = lines
            .iter()
            .map(|(price, qty)| line_total(*price, *qty))
            .collect::<Result<Vec<_>, _>>()?;
        let subtotal = Money::from_minor(checked_sum("subtotal", line_totals)?);

        let discount = match discount {
            Discount::None => Money::zero(),
            Discount::Fixed(amount) => {
                if amount < 0 {
                    return Err(ValidationError::MustNotBeNegative {
                        field: "discount".to_string(),
                    }
                    .into());
                }
                Money::from_minor(amount)
            }
            Discount::Percentage(bps) => {
                if bps > 10000 {
                    return Err(ValidationError::OutOfRange {
                        field: "discount".to_string(),
                        min: 0,
                        max: 10000,
                    }
                    .into());
                }
                subtotal.percentage(bps)
            }
        };

        if discount > subtotal {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: subtotal.minor(),
            }
            .into());
        }

        let taxable = subtotal - discount;
        let tax = taxable.calculate_tax(tax_rate);
        let total = taxable
            .checked_add(tax)
            .and_then(|amount| currency.checked_round(amount.minor()))
            .map(Money::from_minor)
            .ok_or_else(|| out_of_range("total"))?;

        Ok(SaleTotals {
            subtotal: subtotal.minor(),
            discount: discount.minor(),
            tax: tax.minor(),
            total: total.minor(),
        })
    }
}

/// Profit margin in basis points: `trunc(profit * 10000 / total)`, or 0 when
/// the total is not positive.
pub fn margin_bps(profit: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((profit as i128 * 10000) / total as i128) as i64
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_iqd_rounds_up_to_250() {
        assert_eq!(Currency::Iqd.round(0), 0);
        assert_eq!(Currency::Iqd.round(1), 250);
        assert_eq!(Currency::Iqd.round(250), 250);
        assert_eq!(Currency::Iqd.round(251), 500);
        assert_eq!(Currency::Iqd.round(1001), 1250);
        // 1125 is exactly half-way; ceiling still goes up.
        assert_eq!(Currency::Iqd.round(1125), 1250);
    }

    #[test]
    fn test_iqd_ceiling_on_negative_amounts() {
        assert_eq!(Currency::Iqd.round(-300), -250);
        assert_eq!(Currency::Iqd.round(-250), -250);
        assert_eq!(Currency::Iqd.round(-1), 0);
    }

    #[test]
    fn test_usd_is_identity() {
        assert_eq!(round_by_currency(1099, Currency::Usd), 1099);
        assert_eq!(round_by_currency(-7, Currency::Usd), -7);
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("iqd".parse::<Currency>().unwrap(), Currency::Iqd);
        assert_eq!(" USD ".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!(a.checked_mul(3).map(|m| m.minor()), Some(3000));
        assert_eq!(a.checked_add(b).map(|m| m.minor()), Some(1500));
        assert_eq!((-a).minor(), -1000);
        let sum: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(sum.minor(), 2000);
    }

    #[test]
    fn test_tax_calculation_with_rounding() {
        let amount = Money::from_minor(1000);
        let tax = amount.calculate_tax(TaxRate::from_bps(825));
        assert_eq!(tax.minor(), 83);
    }

    #[test]
    fn test_sale_totals_iqd() {
        // 3 × 1000 + 1 × 1100 = 4100, 10% off = 3690, no tax → rounds to 3750
        let totals = SaleTotals::compute(
            &[(1000, 3), (1100, 1)],
            Discount::Percentage(1000),
            TaxRate::zero(),
            Currency::Iqd,
        )
        .unwrap();
        assert_eq!(totals.subtotal, 4100);
        assert_eq!(totals.discount, 410);
        assert_eq!(totals.tax, 0);
        assert_eq!(totals.total, 3750);
    }

    #[test]
    fn test_sale_totals_usd_with_tax() {
        let totals = SaleTotals::compute(
            &[(1000, 1)],
            Discount::Fixed(0),
            TaxRate::from_bps(825),
            Currency::Usd,
        )
        .unwrap();
        assert_eq!(totals.total, 1083);
    }

    #[test]
    fn test_discount_cannot_exceed_subtotal() {
        let result = SaleTotals::compute(
            &[(100, 1)],
            Discount::Fixed(101),
            TaxRate::zero(),
            Currency::Usd,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_lines_are_out_of_range() {
        let err = SaleTotals::compute(
            &[(4_000_000_000, 4_000_000_000)],
            Discount::None,
            TaxRate::zero(),
            Currency::Usd,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "line_total"
        ));

        // Each line fits, the sum does not
        let err = SaleTotals::compute(
            &[(i64::MAX / 2, 1), (i64::MAX / 2, 1), (10, 1)],
            Discount::None,
            TaxRate::zero(),
            Currency::Usd,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "subtotal"
        ));

        // Tax pushes the total past i64
        assert!(SaleTotals::compute(&[(i64::MAX - 10, 1)], Discount::None, TaxRate::from_bps(100), Currency::Usd).is_err());
    }

    #[test]
    fn test_iqd_rounding_at_the_top_of_i64() {
        assert_eq!(Currency::Iqd.checked_round(i64::MAX), None);
        assert_eq!(Currency::Iqd.round(i64::MAX) % IQD_ROUNDING_STEP, 0);
        assert_eq!(Currency::Usd.checked_round(i64::MAX), Some(i64::MAX));
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum("total", vec![1, 2, 3]), Ok(6));
        assert!(checked_sum("total", vec![i64::MAX, 1]).is_err());
    }

    #[test]
    fn test_margin_bps() {
        assert_eq!(margin_bps(250, 1000), 2500);
        // trunc, not round
        assert_eq!(margin_bps(1, 3), 3333);
        assert_eq!(margin_bps(-1, 3), -3333);
        assert_eq!(margin_bps(100, 0), 0);
    }
}
