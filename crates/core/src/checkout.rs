//! Checkout
//!
//! Freezes the selected cart lines and the applied voucher into the items of an order request.
//! Nothing here talks to the backend.

use jiff::Timestamp;
use thiserror::Error;

use crate::{
    cart::Cart,
    discounts::{
        Discount, DiscountCode, DiscountTotals, IneligibleDiscount, allocation, apply_to_selection,
    },
    errors::ValidationError,
    ids::{BookId, CustomerId, DiscountId, SellerId},
    money::{Quantity, StoreMoney},
};

/// Errors from freezing a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Nothing is selected, or totals cannot be computed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The voucher no longer qualifies for the selection.
    #[error(transparent)]
    Ineligible(#[from] IneligibleDiscount),
}

/// One line of an order request.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutItem {
    /// Book ordered.
    pub book: BookId,

    /// Seller fulfilling it.
    pub seller: SellerId,

    /// Copies ordered.
    pub quantity: Quantity,

    /// Price per copy.
    pub unit_price: StoreMoney,

    /// Voucher applied to the line.
    pub discount_code: Option<DiscountCode>,

    /// Share of the saving attributed to the line.
    pub discount_amount: StoreMoney,

    /// `unit_price * quantity - discount_amount`.
    pub total: StoreMoney,
}

/// A frozen selection, ready to become an order.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutDraft {
    /// Customer placing the order.
    pub customer: CustomerId,

    /// Items in cart order.
    pub items: Vec<CheckoutItem>,

    /// Voucher used, if any.
    pub discount: Option<DiscountId>,

    /// Selection totals.
    pub totals: DiscountTotals,
}

impl CheckoutDraft {
    /// Books being ordered.
    pub fn books(&self) -> impl Iterator<Item = BookId> + '_ {
        self.items.iter().map(|item| item.book)
    }
}

/// Freeze the cart's selection with an optional voucher.
///
/// The voucher is re-checked against the selection at `now`, and its saving is split across the
/// items so the per-item amounts add up to the total saving.
///
/// # Errors
///
/// Returns [`ValidationError::EmptySelection`] when nothing is selected, and
/// [`CheckoutError::Ineligible`] when the voucher no longer qualifies.
pub fn freeze(
    cart: &Cart,
    discount: Option<&Discount>,
    now: Timestamp,
) -> Result<CheckoutDraft, CheckoutError> {
    if cart.selection().is_empty() {
        return Err(ValidationError::EmptySelection.into());
    }

    let currency = cart.currency();
    let totals = apply_to_selection(cart.selected_lines(), discount, currency)?;

    if let Some(discount) = discount {
        discount.check_selection(
            cart.customer(),
            cart.selected_lines().map(|line| line.book),
            &totals.original,
            now,
        )?;
    }

    let shares = allocation::allocate(cart.selected_lines(), &totals.saved)?;

    let items = cart
        .selected_lines()
        .zip(shares)
        .map(|(line, share)| -> Result<CheckoutItem, ValidationError> {
            let subtotal = line.subtotal()?;
            let total = subtotal
                .to_minor_units()
                .checked_sub(share.saved.to_minor_units())
                .ok_or(ValidationError::AmountOverflow)?;

            Ok(CheckoutItem {
                book: line.book,
                seller: line.seller,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount_code: discount.map(|discount| discount.code().clone()),
                discount_amount: share.saved,
                total: StoreMoney::from_minor(total, currency),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CheckoutDraft {
        customer: cart.customer(),
        items,
        discount: discount.map(Discount::id),
        totals,
    })
}
