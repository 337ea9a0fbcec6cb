//! Money & Quantities
//!
//! All amounts are integral minor units of a single store currency. Nothing in the engine ever
//! holds a fractional amount: percentage savings are floored as soon as they are computed.

use std::num::NonZeroU32;

use decimal_percentage::Percentage;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusty_money::{Money, iso::Currency};

use crate::errors::ValidationError;

/// Money in the store currency.
pub type StoreMoney = Money<'static, Currency>;

/// A line quantity; always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(NonZeroU32);

/// Outcome of adding a signed delta to a [`Quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line keeps existing with this quantity.
    Set(Quantity),

    /// The delta took the quantity below one; the line must go.
    Remove,
}

impl Quantity {
    /// A quantity of one.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroQuantity`] for `0`.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        NonZeroU32::new(value)
            .map(Self)
            .ok_or(ValidationError::ZeroQuantity)
    }

    /// Quantity for a freshly created line: `max(delta, 1)`.
    pub fn from_delta(delta: i32) -> Self {
        u32::try_from(delta)
            .ok()
            .and_then(NonZeroU32::new)
            .map_or(Self::ONE, Self)
    }

    /// The underlying count.
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Apply a signed delta. Anything that would land below one becomes [`QuantityChange::Remove`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::QuantityOverflow`] if the result does not fit in a `u32`.
    pub fn apply_delta(self, delta: i32) -> Result<QuantityChange, ValidationError> {
        let next = i64::from(self.get()) + i64::from(delta);

        if next < 1 {
            return Ok(QuantityChange::Remove);
        }

        u32::try_from(next)
            .map_err(|_overflow| ValidationError::QuantityOverflow)
            .and_then(Self::new)
            .map(QuantityChange::Set)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// `unit_price * quantity`.
///
/// # Errors
///
/// Returns [`ValidationError::AmountOverflow`] if the product does not fit in minor units.
pub fn line_total(unit_price: &StoreMoney, quantity: Quantity) -> Result<StoreMoney, ValidationError> {
    unit_price
        .to_minor_units()
        .checked_mul(i64::from(quantity.get()))
        .map(|minor| Money::from_minor(minor, unit_price.currency()))
        .ok_or(ValidationError::AmountOverflow)
}

/// Sum amounts that must all share `currency`.
///
/// # Errors
///
/// Returns a [`ValidationError`] on currency mismatch or overflow.
pub fn sum(
    amounts: impl IntoIterator<Item = StoreMoney>,
    currency: &'static Currency,
) -> Result<StoreMoney, ValidationError> {
    amounts
        .into_iter()
        .try_fold(0_i64, |acc, amount| {
            ensure_currency(&amount, currency)?;

            acc.checked_add(amount.to_minor_units())
                .ok_or(ValidationError::AmountOverflow)
        })
        .map(|minor| Money::from_minor(minor, currency))
}

/// Reject amounts in a different currency.
///
/// # Errors
///
/// Returns [`ValidationError::CurrencyMismatch`].
pub fn ensure_currency(
    amount: &StoreMoney,
    currency: &'static Currency,
) -> Result<(), ValidationError> {
    if amount.currency() == currency {
        Ok(())
    } else {
        Err(ValidationError::CurrencyMismatch(
            amount.currency().iso_alpha_code,
            currency.iso_alpha_code,
        ))
    }
}

/// Zero in `currency`.
pub fn zero(currency: &'static Currency) -> StoreMoney {
    Money::from_minor(0, currency)
}

/// Take `percent` of a minor unit amount, rounding toward zero so a discount never exceeds what
/// was authorised.
///
/// # Errors
///
/// Returns [`ValidationError::AmountOverflow`] if the calculation cannot be represented.
pub fn floor_percent_of_minor(percent: &Percentage, minor: i64) -> Result<i64, ValidationError> {
    let minor = Decimal::from_i64(minor).ok_or(ValidationError::AmountOverflow)?;

    ((*percent) * Decimal::ONE) // only way to get at the underlying Decimal
        .checked_mul(minor)
        .ok_or(ValidationError::AmountOverflow)?
        .round_dp_with_strategy(0, RoundingStrategy::ToZero)
        .to_i64()
        .ok_or(ValidationError::AmountOverflow)
}
