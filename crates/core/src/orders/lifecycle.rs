//! Order lifecycle state machine.
//!
//! ```text
//!              seller/admin (payment in place)
//!   PENDING ──────────────────────────────► CONFIRMED ──► SHIPPING ──► DELIVERED
//!      │                                    seller/admin    customer
//!      │ customer any time
//!      │ seller/admin after 24h
//!      ▼
//!   CANCELLED
//! ```
//!
//! [`transition`] is the single authority on whether a move is allowed. Anything missing from
//! the table above is illegal, including asking for the status an order already has.

use std::fmt;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use super::{
    Order, OrderStatus,
    payments::{Payment, PaymentMethod, PaymentStatus},
};

/// How long a pending order must wait before a seller or admin may cancel it.
pub const STALE_PENDING_AFTER: SignedDuration = SignedDuration::from_hours(24);

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The customer who placed the order.
    Customer,

    /// The seller fulfilling it.
    Seller,

    /// A store administrator.
    Admin,
}

impl Role {
    /// Sellers and admins share every order permission.
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Seller | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Customer => "customer",
            Self::Seller => "seller",
            Self::Admin => "admin",
        })
    }
}

/// Why a listed transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFailure {
    /// Confirmation needs a payment record.
    PaymentMissing,

    /// E-wallet payments must have succeeded before confirmation.
    PaymentNotSettled(PaymentStatus),

    /// The seller cancellation window has not opened yet.
    CancelWindowOpen {
        /// Time left until it opens.
        remaining: SignedDuration,
    },
}

impl fmt::Display for GuardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentMissing => f.write_str("order has no payment"),
            Self::PaymentNotSettled(status) => write!(f, "payment is {status}"),
            Self::CancelWindowOpen { remaining } => {
                write!(f, "order can be cancelled in {remaining:#}")
            }
        }
    }
}

/// A refused transition. The order is never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// No such edge for this actor.
    #[error("{role} cannot move an order from {from} to {to}")]
    Illegal {
        /// Current status.
        from: OrderStatus,

        /// Requested status.
        to: OrderStatus,

        /// Requesting actor.
        role: Role,
    },

    /// The edge exists but its guard failed.
    #[error("cannot move an order from {from} to {to}: {reason}")]
    Guard {
        /// Current status.
        from: OrderStatus,

        /// Requested status.
        to: OrderStatus,

        /// Why.
        reason: GuardFailure,
    },
}

/// An allowed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before.
    pub from: OrderStatus,

    /// Status after.
    pub to: OrderStatus,

    /// Actor who made it.
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actors {
    Customer,
    Staff,
}

impl Actors {
    fn admits(self, role: Role) -> bool {
        match self {
            Self::Customer => role == Role::Customer,
            Self::Staff => role.is_staff(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Always,
    PaymentInPlace,
    CancelWindowElapsed,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: OrderStatus,
    to: OrderStatus,
    actors: Actors,
    guard: Guard,
}

const EDGES: [Edge; 5] = [
    Edge {
        from: OrderStatus::Pending,
        to: OrderStatus::Confirmed,
        actors: Actors::Staff,
        guard: Guard::PaymentInPlace,
    },
    Edge {
        from: OrderStatus::Pending,
        to: OrderStatus::Cancelled,
        actors: Actors::Customer,
        guard: Guard::Always,
    },
    Edge {
        from: OrderStatus::Pending,
        to: OrderStatus::Cancelled,
        actors: Actors::Staff,
        guard: Guard::CancelWindowElapsed,
    },
    Edge {
        from: OrderStatus::Confirmed,
        to: OrderStatus::Shipping,
        actors: Actors::Staff,
        guard: Guard::Always,
    },
    Edge {
        from: OrderStatus::Shipping,
        to: OrderStatus::Delivered,
        actors: Actors::Customer,
        guard: Guard::Always,
    },
];

impl Guard {
    fn check(
        self,
        order: &Order,
        payment: Option<&Payment>,
        now: Timestamp,
    ) -> Result<(), GuardFailure> {
        let payment = payment.filter(|payment| payment.order == order.id);

        match self {
            Self::Always => Ok(()),
            Self::PaymentInPlace => match payment {
                None => Err(GuardFailure::PaymentMissing),
                Some(payment) if payment.method == PaymentMethod::Cod => Ok(()),
                Some(payment) if payment.status == PaymentStatus::Success => Ok(()),
                Some(payment) => Err(GuardFailure::PaymentNotSettled(payment.status)),
            },
            Self::CancelWindowElapsed => {
                let since = payment.map_or(order.ordered_at, |payment| payment.paid_at);
                let elapsed = now.duration_since(since);

                if elapsed >= STALE_PENDING_AFTER {
                    Ok(())
                } else {
                    Err(GuardFailure::CancelWindowOpen {
                        remaining: STALE_PENDING_AFTER
                            .checked_sub(elapsed)
                            .unwrap_or(STALE_PENDING_AFTER),
                    })
                }
            }
        }
    }
}

/// Decide whether `role` may move `order` to `to` at `now`.
///
/// `payment` is the order's payment record, if one exists. Confirmation needs a COD payment in
/// any state or an e-wallet payment that succeeded. Seller and admin cancellation waits
/// [`STALE_PENDING_AFTER`] from the payment date, or from the order date without a payment.
///
/// # Errors
///
/// Returns [`TransitionError::Illegal`] for moves not in the table and
/// [`TransitionError::Guard`] when a guard fails.
pub fn transition(
    order: &Order,
    payment: Option<&Payment>,
    to: OrderStatus,
    role: Role,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    let from = order.status;

    let edge = EDGES
        .iter()
        .find(|edge| edge.from == from && edge.to == to && edge.actors.admits(role))
        .ok_or(TransitionError::Illegal { from, to, role })?;

    edge.guard
        .check(order, payment, now)
        .map_err(|reason| TransitionError::Guard { from, to, reason })?;

    Ok(Transition { from, to, role })
}

/// [`transition`], then update the order's status.
///
/// # Errors
///
/// As [`transition`]; the order is untouched on error.
pub fn apply(
    order: &mut Order,
    payment: Option<&Payment>,
    to: OrderStatus,
    role: Role,
    now: Timestamp,
) -> Result<Transition, TransitionError> {
    let transition = transition(order, payment, to, role, now)?;

    order.status = transition.to;

    Ok(transition)
}

/// Statuses `role` could move `order` to right now.
pub fn allowed_transitions(
    order: &Order,
    payment: Option<&Payment>,
    role: Role,
    now: Timestamp,
) -> SmallVec<[OrderStatus; 2]> {
    EDGES
        .iter()
        .filter(|edge| edge.from == order.status && edge.actors.admits(role))
        .filter(|edge| edge.guard.check(order, payment, now).is_ok())
        .map(|edge| edge.to)
        .collect()
}
