//! The single voucher applied to a cart.

use jiff::Timestamp;

use crate::{cart::Cart, errors::ValidationError};

use super::{
    Discount, DiscountError, DiscountTotals, IneligibleDiscount, pricing::apply_to_selection,
};

/// Holds at most one applied voucher. Applying another replaces it.
#[derive(Debug, Clone, Default)]
pub struct VoucherSlot {
    applied: Option<Discount>,
}

impl VoucherSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The applied voucher, if any.
    pub fn applied(&self) -> Option<&Discount> {
        self.applied.as_ref()
    }

    /// Look `code` up among `eligible` and apply it to the cart's current selection.
    ///
    /// # Errors
    ///
    /// Returns [`IneligibleDiscount::NotFound`] when no eligible voucher has that code, otherwise
    /// the errors of [`VoucherSlot::apply`]. A failed apply leaves the slot unchanged.
    pub fn apply_code<'d>(
        &mut self,
        code: &str,
        eligible: impl IntoIterator<Item = &'d Discount>,
        cart: &Cart,
        now: Timestamp,
    ) -> Result<&Discount, DiscountError> {
        let discount = eligible
            .into_iter()
            .find(|discount| discount.code().matches(code))
            .ok_or_else(|| IneligibleDiscount::NotFound(code.trim().to_uppercase()))?;

        self.apply(discount.clone(), cart, now)
    }

    /// Apply `discount` to the cart's current selection, replacing any voucher already held.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError::Ineligible`] if the voucher cannot be used for this customer and
    /// selection, or [`DiscountError::Validation`] if the selection cannot be priced.
    pub fn apply(
        &mut self,
        discount: Discount,
        cart: &Cart,
        now: Timestamp,
    ) -> Result<&Discount, DiscountError> {
        let value = cart.selected_subtotal()?;

        discount.check_selection(
            cart.customer(),
            cart.selected_lines().map(|line| line.book),
            &value,
            now,
        )?;

        Ok(self.applied.insert(discount))
    }

    /// Remove the applied voucher.
    pub fn clear(&mut self) -> Option<Discount> {
        self.applied.take()
    }

    /// Price the cart's current selection with the applied voucher.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] on overflow.
    pub fn totals(&self, cart: &Cart) -> Result<DiscountTotals, ValidationError> {
        apply_to_selection(cart.selected_lines(), self.applied.as_ref(), cart.currency())
    }

    /// Re-check the applied voucher after the cart or selection changed, dropping it if it no
    /// longer qualifies. Returns the dropped voucher and why.
    pub fn revalidate(
        &mut self,
        cart: &Cart,
        now: Timestamp,
    ) -> Option<(Discount, IneligibleDiscount)> {
        let discount = self.applied.as_ref()?;

        let reason = match cart.selected_subtotal() {
            Ok(value) => discount
                .check_selection(
                    cart.customer(),
                    cart.selected_lines().map(|line| line.book),
                    &value,
                    now,
                )
                .err()?,
            Err(_) => IneligibleDiscount::NotApplicable(discount.code().clone()),
        };

        self.applied.take().map(|discount| (discount, reason))
    }
}
