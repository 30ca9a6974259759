//! Fixed-point price and quantity representation
//!
//! Values are stored as signed 64-bit "ticks" where `ticks = round(value * 10^8)`.
//! The scale is carried in the type so a `Price` can never be added to a
//! `Quantity` by accident. Decimal conversions use banker's rounding
//! (midpoint to even).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::Sum;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places carried by both price and quantity ticks.
pub const TICK_DECIMALS: u32 = 8;

/// Ticks per whole unit (10^8).
pub const TICKS_PER_UNIT: i64 = 100_000_000;

/// Compile-time scale marker for [`FixedPoint`].
pub trait Scale: 'static {
    /// Decimal places represented by one tick.
    const DECIMALS: u32;
    /// Ticks per whole unit, `10^DECIMALS`.
    const FACTOR: i64;
    /// Short label used by `Debug`.
    const LABEL: &'static str;
}

/// Scale marker for prices.
#[derive(Debug)]
pub enum PriceScale {}

/// Scale marker for quantities.
#[derive(Debug)]
pub enum QuantityScale {}

impl Scale for PriceScale {
    const DECIMALS: u32 = TICK_DECIMALS;
    const FACTOR: i64 = TICKS_PER_UNIT;
    const LABEL: &'static str = "Price";
}

impl Scale for QuantityScale {
    const DECIMALS: u32 = TICK_DECIMALS;
    const FACTOR: i64 = TICKS_PER_UNIT;
    const LABEL: &'static str = "Quantity";
}

pub type Price = FixedPoint<PriceScale>;
pub type Quantity = FixedPoint<QuantityScale>;

/// Immutable integer-ticks value of scale `S`.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct FixedPoint<S: Scale> {
    ticks: i64,
    #[serde(skip)]
    _scale: PhantomData<S>,
}

impl<S: Scale> FixedPoint<S> {
    pub const ZERO: Self = Self::from_ticks(0);
    pub const MAX: Self = Self::from_ticks(i64::MAX);
    pub const MIN: Self = Self::from_ticks(i64::MIN);

    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        FixedPoint {
            ticks,
            _scale: PhantomData,
        }
    }

    #[inline]
    pub const fn to_ticks(self) -> i64 {
        self.ticks
    }

    /// Convert a whole number of units, e.g. `Price::from_units(50_000)`.
    pub fn from_units(units: i64) -> Self {
        match units.checked_mul(S::FACTOR) {
            Some(ticks) => Self::from_ticks(ticks),
            None => Self::overflowed(units.is_negative()),
        }
    }

    /// Convert from a decimal, rounding half to even at the tick boundary.
    ///
    /// Out-of-range values trip a debug assertion; release builds saturate
    /// to [`FixedPoint::MIN`] / [`FixedPoint::MAX`].
    pub fn from_decimal(value: Decimal) -> Self {
        let ticks = value
            .checked_mul(Decimal::from(S::FACTOR))
            .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
            .and_then(|rounded| rounded.to_i64());

        match ticks {
            Some(ticks) => Self::from_ticks(ticks),
            None => Self::overflowed(value.is_sign_negative()),
        }
    }

    /// Exact decimal value of this tick count.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.ticks, S::DECIMALS)
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.ticks == 0
    }

    #[inline]
    pub const fn is_positive(self) -> bool {
        self.ticks > 0
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self::from_ticks(self.ticks.abs())
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.ticks.checked_add(rhs.ticks).map(Self::from_ticks)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.ticks.checked_sub(rhs.ticks).map(Self::from_ticks)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self::from_ticks(self.ticks.saturating_add(rhs.ticks))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self::from_ticks(self.ticks.saturating_sub(rhs.ticks))
    }

    fn overflowed(negative: bool) -> Self {
        debug_assert!(false, "{} tick conversion overflowed i64", S::LABEL);
        if negative {
            Self::MIN
        } else {
            Self::MAX
        }
    }
}

impl<S: Scale> Clone for FixedPoint<S> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Scale> Copy for FixedPoint<S> {}

impl<S: Scale> Default for FixedPoint<S> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<S: Scale> PartialEq for FixedPoint<S> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ticks == other.ticks
    }
}

impl<S: Scale> Eq for FixedPoint<S> {}

impl<S: Scale> PartialOrd for FixedPoint<S> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Scale> Ord for FixedPoint<S> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks.cmp(&other.ticks)
    }
}

impl<S: Scale> Hash for FixedPoint<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ticks.hash(state);
    }
}

impl<S: Scale> fmt::Debug for FixedPoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", S::LABEL, self.ticks)
    }
}

impl<S: Scale> fmt::Display for FixedPoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_decimal(), f)
    }
}

impl<S: Scale> Add for FixedPoint<S> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::from_ticks(self.ticks + rhs.ticks)
    }
}

impl<S: Scale> AddAssign for FixedPoint<S> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.ticks += rhs.ticks;
    }
}

impl<S: Scale> Sub for FixedPoint<S> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::from_ticks(self.ticks - rhs.ticks)
    }
}

impl<S: Scale> SubAssign for FixedPoint<S> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.ticks -= rhs.ticks;
    }
}

impl<S: Scale> Neg for FixedPoint<S> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::from_ticks(-self.ticks)
    }
}

impl<S: Scale> Mul<i64> for FixedPoint<S> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: i64) -> Self {
        Self::from_ticks(self.ticks * rhs)
    }
}

/// Scale by a decimal factor; the result is rounded half to even.
impl<S: Scale> Mul<Decimal> for FixedPoint<S> {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self {
        let ticks = Decimal::from(self.ticks)
            .checked_mul(rhs)
            .map(|product| product.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
            .and_then(|rounded| rounded.to_i64());

        match ticks {
            Some(ticks) => Self::from_ticks(ticks),
            None => Self::overflowed(self.ticks.is_negative() != rhs.is_sign_negative()),
        }
    }
}

/// Integer division on ticks, truncating toward zero.
impl<S: Scale> Div<i64> for FixedPoint<S> {
    type Output = Self;

    #[inline]
    fn div(self, rhs: i64) -> Self {
        Self::from_ticks(self.ticks / rhs)
    }
}

impl<S: Scale> Sum for FixedPoint<S> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc + v)
    }
}

impl<'a, S: Scale> Sum<&'a FixedPoint<S>> for FixedPoint<S> {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc + *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_decimal_conversions() {
        let price = Price::from_decimal(dec("123.456"));
        assert_eq!(price.to_ticks(), 12_345_600_000);
        assert_eq!(price.to_decimal(), dec("123.456"));
        assert_eq!(Price::from_units(50_000).to_ticks(), 5_000_000_000_000);
    }

    #[test]
    fn test_bankers_rounding() {
        // 0.5 tick rounds to the even neighbour
        assert_eq!(Quantity::from_decimal(dec("0.000000005")).to_ticks(), 0);
        assert_eq!(Quantity::from_decimal(dec("0.000000015")).to_ticks(), 2);
        assert_eq!(Quantity::from_decimal(dec("0.000000025")).to_ticks(), 2);
        assert_eq!(Quantity::from_decimal(dec("-0.000000015")).to_ticks(), -2);
        assert_eq!(Quantity::from_decimal(dec("0.0000000151")).to_ticks(), 2);
    }

    #[test]
    fn test_arithmetic() {
        let a = Price::from_ticks(100);
        let b = Price::from_ticks(40);
        assert_eq!((a + b).to_ticks(), 140);
        assert_eq!((a - b).to_ticks(), 60);
        assert_eq!((a * 3).to_ticks(), 300);
        assert_eq!((a / 3).to_ticks(), 33);
        assert_eq!((-a).to_ticks(), -100);
        assert_eq!((-a).abs(), a);
        assert!((a - a).is_zero());
        assert!(!b.is_zero());
        assert_eq!((a * dec("0.125")).to_ticks(), 12); // 12.5 -> 12
        assert_eq!((Price::from_ticks(300) * dec("0.125")).to_ticks(), 38); // 37.5 -> 38
    }

    #[test]
    fn test_ordering_and_sum() {
        let mut prices = vec![Price::from_ticks(3), Price::from_ticks(-1), Price::from_ticks(2)];
        prices.sort();
        assert_eq!(prices, vec![Price::from_ticks(-1), Price::from_ticks(2), Price::from_ticks(3)]);

        let total: Price = prices.iter().sum();
        assert_eq!(total.to_ticks(), 4);
    }

    #[test]
    fn test_checked_ops() {
        assert_eq!(Price::MAX.checked_add(Price::from_ticks(1)), None);
        assert_eq!(Price::MIN.checked_sub(Price::from_ticks(1)), None);
        assert_eq!(Price::MAX.saturating_add(Price::from_ticks(1)), Price::MAX);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "overflowed")]
    fn test_overflow_asserts_in_debug() {
        let _ = Price::from_decimal(Decimal::MAX);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_overflow_saturates_in_release() {
        assert_eq!(Price::from_decimal(Decimal::MAX), Price::MAX);
        assert_eq!(Price::from_decimal(Decimal::MIN), Price::MIN);
    }

    #[test]
    fn test_display_and_serde() {
        let qty = Quantity::from_ticks(150_000_000);
        assert_eq!(qty.to_string(), "1.50000000");
        assert_eq!(serde_json::to_string(&qty).unwrap(), "150000000");
        let back: Quantity = serde_json::from_str("150000000").unwrap();
        assert_eq!(back, qty);
    }
}
