//! Quire
//!
//! Quire is the cart, voucher and order lifecycle engine behind a multi-seller book storefront.
//!
//! Everything in this crate is pure, synchronous domain logic: cart assembly and selection,
//! voucher eligibility and pricing, the order status state machine, and the reconciliation
//! helpers used by order dashboards. Talking to the storefront backend is left to callers.

pub mod cart;
pub mod checkout;
pub mod discounts;
pub mod errors;
pub mod ids;
pub mod money;
pub mod orders;
pub mod prelude;
pub mod reconcile;
pub mod selection;

#[cfg(test)]
pub(crate) mod fixtures;
