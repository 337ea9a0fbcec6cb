//! Pricing a selection with at most one voucher.

use jiff::Timestamp;
use rusty_money::{Money, iso::Currency};

use crate::{
    cart::{CartLine, subtotal_of},
    errors::ValidationError,
    money::{self, StoreMoney},
};

use super::Discount;

/// Totals for a selection, before and after a voucher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscountTotals {
    /// Sum of selected line subtotals.
    pub original: StoreMoney,

    /// What the customer pays: `original - saved`.
    pub discounted: StoreMoney,

    /// Amount taken off; never more than `original`.
    pub saved: StoreMoney,
}

impl DiscountTotals {
    /// Totals with nothing taken off.
    pub fn undiscounted(original: StoreMoney) -> Self {
        Self {
            original,
            discounted: original,
            saved: money::zero(original.currency()),
        }
    }
}

/// Price `lines` with an optional voucher.
///
/// Eligibility is not checked here; callers decide whether the voucher may be used. A percentage
/// saving is floored to minor units and any saving is capped at the original total, so
/// `discounted` is never negative.
///
/// # Errors
///
/// Returns a [`ValidationError`] on overflow or currency mismatch.
pub fn apply_to_selection<'l>(
    lines: impl IntoIterator<Item = &'l CartLine>,
    discount: Option<&Discount>,
    currency: &'static Currency,
) -> Result<DiscountTotals, ValidationError> {
    let original = subtotal_of(lines, currency)?;

    let Some(discount) = discount else {
        return Ok(DiscountTotals::undiscounted(original));
    };

    let raw = discount.value().raw_saving(&original)?;
    let saved_minor = raw
        .to_minor_units()
        .clamp(0, original.to_minor_units().max(0));

    let discounted_minor = original
        .to_minor_units()
        .checked_sub(saved_minor)
        .ok_or(ValidationError::AmountOverflow)?;

    Ok(DiscountTotals {
        original,
        discounted: Money::from_minor(discounted_minor, currency),
        saved: Money::from_minor(saved_minor, currency),
    })
}

/// Of the vouchers usable for `value` at `now`, the one saving the most. Ties go to the earliest.
///
/// # Errors
///
/// Returns a [`ValidationError`] if a saving cannot be computed.
pub fn best_discount<'d>(
    discounts: impl IntoIterator<Item = &'d Discount>,
    value: &StoreMoney,
    now: Timestamp,
) -> Result<Option<&'d Discount>, ValidationError> {
    let mut best: Option<(&'d Discount, i64)> = None;

    for discount in discounts {
        if !discount.can_apply(value, now) {
            continue;
        }

        let saved = discount
            .value()
            .raw_saving(value)?
            .to_minor_units()
            .min(value.to_minor_units());

        if best.is_none_or(|(_, current)| saved > current) {
            best = Some((discount, saved));
        }
    }

    Ok(best.map(|(discount, _)| discount))
}
