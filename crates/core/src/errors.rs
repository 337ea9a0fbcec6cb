//! Validation errors shared by every engine module.

use thiserror::Error;

/// Malformed input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Quantities start at one.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// A quantity grew beyond what can be represented.
    #[error("quantity overflowed")]
    QuantityOverflow,

    /// An amount could not be represented in minor units.
    #[error("amount overflowed")]
    AmountOverflow,

    /// A money value used a different currency than the one expected (found, expected).
    #[error("amount has currency {0}, expected {1}")]
    CurrencyMismatch(&'static str, &'static str),

    /// Discount codes cannot be blank.
    #[error("discount code is empty")]
    EmptyCode,

    /// Discount amounts must be strictly positive.
    #[error("discount amount must be greater than zero")]
    NonPositiveDiscount,

    /// Percentage discounts must lie in `(0, 100]`.
    #[error("percentage discount must be within (0, 100]")]
    PercentageOutOfRange,

    /// Minimum order values cannot be negative.
    #[error("minimum order value cannot be negative")]
    NegativeMinimum,

    /// A checkout needs at least one selected line.
    #[error("no cart lines are selected")]
    EmptySelection,
}
