//! Payments and cash-on-delivery settlement.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids::{OrderId, PaymentId},
    money::StoreMoney,
};

use super::{Order, OrderStatus, lifecycle::Role};

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Cash on delivery.
    #[serde(rename = "COD")]
    Cod,

    /// MoMo e-wallet.
    #[serde(rename = "MOMO")]
    Momo,

    /// VNPay gateway.
    #[serde(rename = "VNPAY")]
    VnPay,
}

impl PaymentMethod {
    /// Whether the method is cash on delivery.
    pub fn is_cod(self) -> bool {
        self == Self::Cod
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cod => "COD",
            Self::Momo => "MOMO",
            Self::VnPay => "VNPAY",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Not yet settled.
    Pending,

    /// Money received.
    Success,

    /// Settlement failed.
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        })
    }
}

/// The payment record of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    /// Backend id.
    pub id: PaymentId,

    /// Order paid for.
    pub order: OrderId,

    /// Payment method.
    pub method: PaymentMethod,

    /// Settlement state.
    pub status: PaymentStatus,

    /// Amount charged.
    pub amount: StoreMoney,

    /// When the payment record was created.
    pub paid_at: Timestamp,
}

impl Payment {
    /// Cash on delivery still waiting for the seller to collect.
    pub fn is_awaiting_cod(&self) -> bool {
        self.method.is_cod() && self.status == PaymentStatus::Pending
    }
}

/// Outcome of a COD confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodConfirmation {
    /// The payment moved from PENDING to SUCCESS.
    Confirmed,

    /// The payment was already SUCCESS; nothing changed.
    AlreadyConfirmed,
}

/// Reasons a COD payment cannot be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Only COD payments are confirmed by hand.
    #[error("payment {payment} uses {method}, not COD")]
    NotCod {
        /// Payment concerned.
        payment: PaymentId,

        /// Its method.
        method: PaymentMethod,
    },

    /// Cash is only collected once the order is delivered.
    #[error("order {order} is {status}, not DELIVERED")]
    OrderNotDelivered {
        /// Order concerned.
        order: OrderId,

        /// Its status.
        status: OrderStatus,
    },

    /// A failed payment cannot be confirmed.
    #[error("payment {0} has failed")]
    PaymentFailed(PaymentId),

    /// The actor may not confirm payments.
    #[error("{0} may not confirm payments")]
    NotPermitted(Role),

    /// The payment belongs to a different order.
    #[error("payment {payment} belongs to order {expected}, not {order}")]
    OrderMismatch {
        /// Payment concerned.
        payment: PaymentId,

        /// Order the payment belongs to.
        expected: OrderId,

        /// Order given.
        order: OrderId,
    },
}

/// Mark a delivered order's COD payment as collected. Calling it again is a no-op.
///
/// # Errors
///
/// Returns a [`PaymentError`] for customers, non-COD or failed payments, mismatched orders and
/// orders not yet delivered. The payment is untouched on error.
pub fn confirm_cod(
    order: &Order,
    payment: &mut Payment,
    role: Role,
) -> Result<CodConfirmation, PaymentError> {
    if !role.is_staff() {
        return Err(PaymentError::NotPermitted(role));
    }

    if payment.order != order.id {
        return Err(PaymentError::OrderMismatch {
            payment: payment.id,
            expected: payment.order,
            order: order.id,
        });
    }

    if !payment.method.is_cod() {
        return Err(PaymentError::NotCod {
            payment: payment.id,
            method: payment.method,
        });
    }

    match payment.status {
        PaymentStatus::Success => Ok(CodConfirmation::AlreadyConfirmed),
        PaymentStatus::Failed => Err(PaymentError::PaymentFailed(payment.id)),
        PaymentStatus::Pending if order.status != OrderStatus::Delivered => {
            Err(PaymentError::OrderNotDelivered {
                order: order.id,
                status: order.status,
            })
        }
        PaymentStatus::Pending => {
            payment.status = PaymentStatus::Success;

            Ok(CodConfirmation::Confirmed)
        }
    }
}
