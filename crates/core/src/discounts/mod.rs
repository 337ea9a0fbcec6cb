//! Discounts
//!
//! Voucher codes issued by sellers: what they are worth, who may use them and when. Pricing a
//! selection lives in [`pricing`], the "one voucher at a time" rule in [`slot`], and splitting a
//! saving across order lines in [`allocation`].

use std::fmt;

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    errors::ValidationError,
    ids::{BookId, CustomerId, DiscountId},
    money::{self, StoreMoney},
};

pub mod allocation;
pub mod pricing;
pub mod slot;

pub use pricing::{DiscountTotals, apply_to_selection, best_discount};
pub use slot::VoucherSlot;

/// Reasons a voucher cannot be used for the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IneligibleDiscount {
    /// No eligible voucher has this code.
    #[error("discount code {0} is not eligible")]
    NotFound(String),

    /// The voucher has been switched off.
    #[error("discount code {0} is inactive")]
    Inactive(DiscountCode),

    /// The voucher's expiry has passed.
    #[error("discount code {0} has expired")]
    Expired(DiscountCode),

    /// The selection is worth less than the voucher's minimum order value.
    #[error("order value {value} is below minimum order value {minimum} for {code}")]
    BelowMinimum {
        /// Voucher code.
        code: DiscountCode,

        /// Required minimum, in minor units.
        minimum: i64,

        /// Selection value, in minor units.
        value: i64,
    },

    /// The voucher is restricted to books none of which are selected.
    #[error("discount code {0} does not apply to the selected books")]
    NotApplicable(DiscountCode),

    /// The customer has already used this voucher.
    #[error("discount code {0} has already been used")]
    AlreadyUsed(DiscountCode),
}

/// Errors from applying or pricing a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    /// Input failed validation or arithmetic overflowed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The voucher cannot be used.
    #[error(transparent)]
    Ineligible(#[from] IneligibleDiscount),
}

/// Case-insensitive voucher code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiscountCode(String);

impl DiscountCode {
    /// Normalise a code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCode`] for a blank code.
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();

        if code.is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        Ok(Self(code.to_uppercase()))
    }

    /// The normalised code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `raw` names this code, ignoring case and surrounding whitespace.
    pub fn matches(&self, raw: &str) -> bool {
        raw.trim().to_uppercase() == self.0
    }
}

impl fmt::Display for DiscountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DiscountCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DiscountCode> for String {
    fn from(value: DiscountCode) -> Self {
        value.0
    }
}

/// How much a voucher takes off.
#[derive(Debug, Clone, Copy)]
pub enum DiscountValue {
    /// A share of the selection total (e.g. "10% off").
    PercentageOff(Percentage),

    /// A fixed amount off the selection total (e.g. "50.000₫ off").
    AmountOff(StoreMoney),
}

impl DiscountValue {
    /// A percentage discount given in points, e.g. `10` for 10%.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PercentageOutOfRange`] unless `0 < points <= 100`.
    pub fn percentage(points: Decimal) -> Result<Self, ValidationError> {
        if points <= Decimal::ZERO || points > Decimal::ONE_HUNDRED {
            return Err(ValidationError::PercentageOutOfRange);
        }

        Ok(Self::PercentageOff(Percentage::from(
            points / Decimal::ONE_HUNDRED,
        )))
    }

    /// A fixed amount discount.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveDiscount`] unless the amount is positive.
    pub fn amount(amount: StoreMoney) -> Result<Self, ValidationError> {
        if amount.to_minor_units() <= 0 {
            return Err(ValidationError::NonPositiveDiscount);
        }

        Ok(Self::AmountOff(amount))
    }

    /// Whether this is a percentage discount.
    pub fn is_percentage(&self) -> bool {
        matches!(self, Self::PercentageOff(_))
    }

    /// Percentage points (`10` for 10%), for percentage discounts.
    pub fn percentage_points(&self) -> Option<Decimal> {
        match self {
            Self::PercentageOff(percent) => Some((*percent) * Decimal::ONE_HUNDRED),
            Self::AmountOff(_) => None,
        }
    }

    /// Saving before capping: `floor(original * p)` or the fixed amount.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] on overflow or if a fixed amount is in another currency.
    pub fn raw_saving(&self, original: &StoreMoney) -> Result<StoreMoney, ValidationError> {
        match self {
            Self::PercentageOff(percent) => {
                money::floor_percent_of_minor(percent, original.to_minor_units())
                    .map(|minor| StoreMoney::from_minor(minor, original.currency()))
            }
            Self::AmountOff(amount) => {
                money::ensure_currency(amount, original.currency())?;

                Ok(*amount)
            }
        }
    }
}

/// Data for constructing a [`Discount`].
#[derive(Debug, Clone)]
pub struct NewDiscount {
    /// Backend id.
    pub id: DiscountId,

    /// Voucher code.
    pub code: DiscountCode,

    /// What the voucher takes off.
    pub value: DiscountValue,

    /// Smallest selection value the voucher accepts.
    pub min_order_value: StoreMoney,

    /// When the voucher stops working; `None` never expires.
    pub expires_at: Option<Timestamp>,

    /// Whether the voucher is switched on.
    pub active: bool,

    /// Books the voucher is restricted to; empty means every book.
    pub applicable_books: Vec<BookId>,

    /// Customers who already received or used the voucher.
    pub used_by: Vec<CustomerId>,
}

/// A voucher. Read-only as far as the cart engine is concerned.
#[derive(Debug, Clone)]
pub struct Discount {
    id: DiscountId,
    code: DiscountCode,
    value: DiscountValue,
    min_order_value: StoreMoney,
    expires_at: Option<Timestamp>,
    active: bool,
    applicable_books: FxHashSet<BookId>,
    used_by: FxHashSet<CustomerId>,
}

impl Discount {
    /// Build a validated voucher.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NegativeMinimum`] for a negative minimum order value, or a
    /// currency mismatch between a fixed amount and the minimum.
    pub fn new(discount: NewDiscount) -> Result<Self, ValidationError> {
        if discount.min_order_value.to_minor_units() < 0 {
            return Err(ValidationError::NegativeMinimum);
        }

        if let DiscountValue::AmountOff(amount) = &discount.value {
            money::ensure_currency(amount, discount.min_order_value.currency())?;
        }

        Ok(Self {
            id: discount.id,
            code: discount.code,
            value: discount.value,
            min_order_value: discount.min_order_value,
            expires_at: discount.expires_at,
            active: discount.active,
            applicable_books: discount.applicable_books.into_iter().collect(),
            used_by: discount.used_by.into_iter().collect(),
        })
    }

    /// Backend id.
    pub fn id(&self) -> DiscountId {
        self.id
    }

    /// Voucher code.
    pub fn code(&self) -> &DiscountCode {
        &self.code
    }

    /// What the voucher takes off.
    pub fn value(&self) -> &DiscountValue {
        &self.value
    }

    /// Smallest selection value the voucher accepts.
    pub fn min_order_value(&self) -> &StoreMoney {
        &self.min_order_value
    }

    /// Expiry instant, if any.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Whether the voucher is switched on.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Books the voucher is restricted to; empty means every book.
    pub fn applicable_books(&self) -> impl Iterator<Item = BookId> + '_ {
        self.applicable_books.iter().copied()
    }

    /// Whether the voucher covers `book`.
    pub fn applies_to(&self, book: BookId) -> bool {
        self.applicable_books.is_empty() || self.applicable_books.contains(&book)
    }

    /// Whether `customer` already received or used the voucher.
    pub fn used_by(&self, customer: CustomerId) -> bool {
        self.used_by.contains(&customer)
    }

    /// Whether the voucher has expired at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// `active && now < expiry && value >= min_order_value`.
    pub fn can_apply(&self, value: &StoreMoney, now: Timestamp) -> bool {
        self.check(value, now).is_ok()
    }

    /// Like [`Discount::can_apply`], but says why not.
    ///
    /// # Errors
    ///
    /// Returns the first failing guard as an [`IneligibleDiscount`].
    pub fn check(&self, value: &StoreMoney, now: Timestamp) -> Result<(), IneligibleDiscount> {
        if !self.active {
            return Err(IneligibleDiscount::Inactive(self.code.clone()));
        }

        if self.is_expired(now) {
            return Err(IneligibleDiscount::Expired(self.code.clone()));
        }

        let minimum = self.min_order_value.to_minor_units();
        let value_minor = value.to_minor_units();

        if value.currency() != self.min_order_value.currency() || value_minor < minimum {
            return Err(IneligibleDiscount::BelowMinimum {
                code: self.code.clone(),
                minimum,
                value: value_minor,
            });
        }

        Ok(())
    }

    /// Full eligibility for a customer's selection: [`Discount::check`], not already used by the
    /// customer, and covering at least one selected book.
    ///
    /// # Errors
    ///
    /// Returns the first failing guard as an [`IneligibleDiscount`].
    pub fn check_selection(
        &self,
        customer: CustomerId,
        books: impl IntoIterator<Item = BookId>,
        value: &StoreMoney,
        now: Timestamp,
    ) -> Result<(), IneligibleDiscount> {
        self.check(value, now)?;

        if self.used_by(customer) {
            return Err(IneligibleDiscount::AlreadyUsed(self.code.clone()));
        }

        if !books.into_iter().any(|book| self.applies_to(book)) {
            return Err(IneligibleDiscount::NotApplicable(self.code.clone()));
        }

        Ok(())
    }
}

/// `discount.active && now < discount.expiry && value >= discount.min_order_value`.
pub fn can_apply(discount: &Discount, value: &StoreMoney, now: Timestamp) -> bool {
    discount.can_apply(value, now)
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::fixtures::{amount_discount, percentage_discount, vnd};

    use super::*;

    #[test]
    fn codes_are_normalised_upper_case() -> TestResult {
        let code = DiscountCode::new("  summer10 ")?;

        assert_eq!(code.as_str(), "SUMMER10");
        assert!(code.matches("Summer10"));
        assert!(!code.matches("WINTER10"));

        Ok(())
    }

    #[test]
    fn blank_code_is_rejected() {
        assert_eq!(DiscountCode::new("   "), Err(ValidationError::EmptyCode));
    }

    #[test]
    fn percentage_must_be_within_range() {
        assert!(DiscountValue::percentage(Decimal::ZERO).is_err());
        assert!(DiscountValue::percentage(Decimal::from(101)).is_err());
        assert!(DiscountValue::percentage(Decimal::ONE_HUNDRED).is_ok());
    }

    #[test]
    fn amount_must_be_positive() {
        assert_eq!(
            DiscountValue::amount(vnd(0)).map(|value| value.is_percentage()),
            Err(ValidationError::NonPositiveDiscount)
        );
    }

    #[test]
    fn percentage_points_round_trip() -> TestResult {
        let value = DiscountValue::percentage(Decimal::from(15))?;

        assert_eq!(value.percentage_points(), Some(Decimal::from(15)));

        Ok(())
    }

    #[test]
    fn can_apply_boundary_at_minimum() -> TestResult {
        let discount = percentage_discount("TEN", 10, 5_000)?;
        let now = Timestamp::now();

        assert!(!can_apply(&discount, &vnd(4_999), now));
        assert!(can_apply(&discount, &vnd(5_000), now));
        assert!(can_apply(&discount, &vnd(5_001), now));

        Ok(())
    }

    #[test]
    fn expired_discount_cannot_apply() -> TestResult {
        let now = Timestamp::now();
        let mut new = NewDiscount {
            id: DiscountId::new(3),
            code: DiscountCode::new("OLD")?,
            value: DiscountValue::amount(vnd(1_000))?,
            min_order_value: vnd(0),
            expires_at: Some(now),
            active: true,
            applicable_books: Vec::new(),
            used_by: Vec::new(),
        };

        let at_expiry = Discount::new(new.clone())?;
        assert_eq!(
            at_expiry.check(&vnd(10_000), now),
            Err(IneligibleDiscount::Expired(DiscountCode::new("OLD")?))
        );

        new.expires_at = Some(now.checked_add(SignedDuration::from_secs(1))?);
        assert!(Discount::new(new)?.can_apply(&vnd(10_000), now));

        Ok(())
    }

    #[test]
    fn inactive_discount_cannot_apply() -> TestResult {
        let mut new = NewDiscount {
            id: DiscountId::new(3),
            code: DiscountCode::new("OFF")?,
            value: DiscountValue::amount(vnd(1_000))?,
            min_order_value: vnd(0),
            expires_at: None,
            active: false,
            applicable_books: Vec::new(),
            used_by: Vec::new(),
        };

        assert!(!Discount::new(new.clone())?.can_apply(&vnd(10_000), Timestamp::now()));

        new.active = true;
        assert!(Discount::new(new)?.can_apply(&vnd(10_000), Timestamp::now()));

        Ok(())
    }

    #[test]
    fn negative_minimum_is_rejected() -> TestResult {
        let result = amount_discount("NEG", 1_000, -1);

        assert!(matches!(result, Err(ValidationError::NegativeMinimum)));

        Ok(())
    }

    #[test]
    fn check_selection_rejects_used_and_unrelated_books() -> TestResult {
        let now = Timestamp::now();
        let discount = Discount::new(NewDiscount {
            id: DiscountId::new(4),
            code: DiscountCode::new("BOOK7")?,
            value: DiscountValue::amount(vnd(1_000))?,
            min_order_value: vnd(0),
            expires_at: None,
            active: true,
            applicable_books: vec![BookId::new(7)],
            used_by: vec![CustomerId::new(5)],
        })?;

        assert!(matches!(
            discount.check_selection(CustomerId::new(5), [BookId::new(7)], &vnd(1), now),
            Err(IneligibleDiscount::AlreadyUsed(_))
        ));
        assert!(matches!(
            discount.check_selection(CustomerId::new(1), [BookId::new(8)], &vnd(1), now),
            Err(IneligibleDiscount::NotApplicable(_))
        ));
        assert!(
            discount
                .check_selection(CustomerId::new(1), [BookId::new(8), BookId::new(7)], &vnd(1), now)
                .is_ok()
        );

        Ok(())
    }
}
