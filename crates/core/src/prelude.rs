//! Quire prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cart::{
        Cart, CartError, CartLine, LineChange, NewCartLine,
        groups::{SellerGroup, SellerGroups},
        pending::PendingChange,
    },
    checkout::{CheckoutDraft, CheckoutError, CheckoutItem, freeze},
    discounts::{
        Discount, DiscountCode, DiscountError, DiscountTotals, DiscountValue, IneligibleDiscount,
        NewDiscount, VoucherSlot,
        allocation::{LineSaving, allocate},
        apply_to_selection, best_discount, can_apply,
    },
    errors::ValidationError,
    ids::{BookId, CustomerId, DiscountId, OrderId, PaymentId, SellerId, TypedId},
    money::{Quantity, QuantityChange, StoreMoney},
    orders::{
        CodConfirmation, GuardFailure, Order, OrderLine, OrderStatus, Payment, PaymentError,
        PaymentMethod, PaymentStatus, Role, STALE_PENDING_AFTER, Transition, TransitionError,
        allowed_transitions, confirm_cod, transition,
    },
    reconcile::{
        OrderQuery, OrderSort, OrderWithPayment, StatusCounts, awaiting_cod_confirmation, join,
        seller_revenue, spend_total, stale_pending,
    },
    selection::SelectionSet,
};
