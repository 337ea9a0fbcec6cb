//! Orders
//!
//! Placed orders are snapshots: their lines keep the price, title and voucher share they had at
//! checkout. After creation only [`lifecycle`] moves them between statuses, and [`payments`]
//! settles cash on delivery.

use std::fmt;

use jiff::Timestamp;
use rusty_money::iso::Currency;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ValidationError,
    ids::{BookId, CustomerId, OrderId, SellerId},
    money::{self, Quantity, StoreMoney},
};

pub mod lifecycle;
pub mod payments;

pub use lifecycle::{
    GuardFailure, Role, STALE_PENDING_AFTER, Transition, TransitionError, allowed_transitions,
    apply, transition,
};
pub use payments::{
    CodConfirmation, Payment, PaymentError, PaymentMethod, PaymentStatus, confirm_cod,
};

/// Where an order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed, awaiting the seller.
    Pending,

    /// Accepted by the seller.
    Confirmed,

    /// Handed to the carrier.
    Shipping,

    /// Received by the customer. Terminal.
    Delivered,

    /// Abandoned. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Shipping,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Wire name, e.g. `"PENDING"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Shipping => "SHIPPING",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One book of a placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    /// Book bought.
    pub book: BookId,

    /// Seller fulfilling the line.
    pub seller: SellerId,

    /// Seller's store name at checkout.
    pub store_name: String,

    /// Book title at checkout.
    pub title: String,

    /// Price per copy at checkout.
    pub unit_price: StoreMoney,

    /// Copies bought.
    pub quantity: Quantity,

    /// Voucher code applied to the line, if any.
    pub discount_code: Option<String>,

    /// Share of the voucher saving attributed to the line.
    pub discount_amount: StoreMoney,

    /// What the customer pays for the line.
    pub total: StoreMoney,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Backend id.
    pub id: OrderId,

    /// Customer who placed it.
    pub customer: CustomerId,

    /// Current status.
    pub status: OrderStatus,

    /// Line snapshots.
    pub lines: Vec<OrderLine>,

    /// What the customer pays for the whole order.
    pub total_price: StoreMoney,

    /// When the order was placed.
    pub ordered_at: Timestamp,
}

impl Order {
    /// Whether any line is fulfilled by `seller`.
    pub fn contains_seller(&self, seller: SellerId) -> bool {
        self.lines.iter().any(|line| line.seller == seller)
    }

    /// Lines fulfilled by `seller`.
    pub fn lines_for_seller(&self, seller: SellerId) -> impl Iterator<Item = &OrderLine> + '_ {
        self.lines.iter().filter(move |line| line.seller == seller)
    }

    /// Sum of line totals for `seller`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] on overflow or currency mismatch.
    pub fn seller_total(&self, seller: SellerId) -> Result<StoreMoney, ValidationError> {
        money::sum(
            self.lines_for_seller(seller).map(|line| line.total),
            self.currency(),
        )
    }

    /// Total copies across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Only delivered orders can be reviewed.
    pub fn can_leave_feedback(&self) -> bool {
        self.status == OrderStatus::Delivered
    }

    /// Lines the customer may review, one entry per book bought. Empty until delivery.
    pub fn feedback_lines(&self) -> impl Iterator<Item = &OrderLine> + '_ {
        let delivered = self.can_leave_feedback();

        self.lines.iter().filter(move |_| delivered)
    }

    /// Currency the order is priced in.
    pub fn currency(&self) -> &'static Currency {
        self.total_price.currency()
    }
}
