//! Joins and summaries over order and payment lists, as shown on the customer, seller and admin
//! dashboards.

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ValidationError,
    ids::{OrderId, SellerId},
    money::{self, StoreMoney},
    orders::{Order, OrderStatus, Payment, STALE_PENDING_AFTER},
};

/// An order with its payment record, if one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderWithPayment {
    /// The order.
    pub order: Order,

    /// Its payment.
    pub payment: Option<Payment>,
}

/// Pair every order with its payment. When an order has several payments the latest one wins
/// (by payment date, then by list position). Orders keep their input order.
pub fn join(
    orders: impl IntoIterator<Item = Order>,
    payments: impl IntoIterator<Item = Payment>,
) -> Vec<OrderWithPayment> {
    let mut latest: FxHashMap<OrderId, Payment> = FxHashMap::default();

    for payment in payments {
        let superseded = latest
            .get(&payment.order)
            .is_some_and(|existing| existing.paid_at > payment.paid_at);

        if !superseded {
            latest.insert(payment.order, payment);
        }
    }

    orders
        .into_iter()
        .map(|order| {
            let payment = latest.remove(&order.id);

            OrderWithPayment { order, payment }
        })
        .collect()
}

/// Number of orders per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// PENDING orders.
    pub pending: usize,

    /// CONFIRMED orders.
    pub confirmed: usize,

    /// SHIPPING orders.
    pub shipping: usize,

    /// DELIVERED orders.
    pub delivered: usize,

    /// CANCELLED orders.
    pub cancelled: usize,
}

impl StatusCounts {
    /// Count for one status.
    pub fn get(&self, status: OrderStatus) -> usize {
        match status {
            OrderStatus::Pending => self.pending,
            OrderStatus::Confirmed => self.confirmed,
            OrderStatus::Shipping => self.shipping,
            OrderStatus::Delivered => self.delivered,
            OrderStatus::Cancelled => self.cancelled,
        }
    }

    /// Every order regardless of status.
    pub fn all(&self) -> usize {
        self.pending + self.confirmed + self.shipping + self.delivered + self.cancelled
    }

    fn bump(&mut self, status: OrderStatus) {
        let slot = match status {
            OrderStatus::Pending => &mut self.pending,
            OrderStatus::Confirmed => &mut self.confirmed,
            OrderStatus::Shipping => &mut self.shipping,
            OrderStatus::Delivered => &mut self.delivered,
            OrderStatus::Cancelled => &mut self.cancelled,
        };

        *slot += 1;
    }
}

/// Count orders per status.
pub fn status_counts<'o>(orders: impl IntoIterator<Item = &'o Order>) -> StatusCounts {
    orders
        .into_iter()
        .fold(StatusCounts::default(), |mut counts, order| {
            counts.bump(order.status);
            counts
        })
}

/// What a customer has spent: the total price of their delivered orders.
///
/// # Errors
///
/// Returns a [`ValidationError`] on overflow or currency mismatch.
pub fn spend_total<'o>(
    orders: impl IntoIterator<Item = &'o Order>,
    currency: &'static Currency,
) -> Result<StoreMoney, ValidationError> {
    money::sum(
        orders
            .into_iter()
            .filter(|order| order.status == OrderStatus::Delivered)
            .map(|order| order.total_price),
        currency,
    )
}

/// What a seller has earned: their line totals across delivered orders.
///
/// # Errors
///
/// Returns a [`ValidationError`] on overflow or currency mismatch.
pub fn seller_revenue<'o>(
    orders: impl IntoIterator<Item = &'o Order>,
    seller: SellerId,
    currency: &'static Currency,
) -> Result<StoreMoney, ValidationError> {
    money::sum(
        orders
            .into_iter()
            .filter(|order| order.status == OrderStatus::Delivered)
            .flat_map(|order| order.lines_for_seller(seller))
            .map(|line| line.total),
        currency,
    )
}

/// Delivered orders whose cash on delivery has not been collected yet.
pub fn awaiting_cod_confirmation(
    joined: &[OrderWithPayment],
) -> impl Iterator<Item = &OrderWithPayment> + '_ {
    joined.iter().filter(|entry| {
        entry.order.status == OrderStatus::Delivered
            && entry.payment.as_ref().is_some_and(Payment::is_awaiting_cod)
    })
}

/// Pending orders a seller may cancel because they have waited at least
/// [`STALE_PENDING_AFTER`] since payment (or since ordering, without a payment).
pub fn stale_pending(
    joined: &[OrderWithPayment],
    now: Timestamp,
) -> impl Iterator<Item = &OrderWithPayment> + '_ {
    joined.iter().filter(move |entry| {
        let since = entry
            .payment
            .as_ref()
            .map_or(entry.order.ordered_at, |payment| payment.paid_at);

        entry.order.status == OrderStatus::Pending
            && now.duration_since(since) >= STALE_PENDING_AFTER
    })
}

/// How to order an order list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderSort {
    /// Most recent first.
    #[default]
    Newest,

    /// Oldest first.
    Oldest,

    /// Most expensive first.
    PriceHighToLow,

    /// Cheapest first.
    PriceLowToHigh,
}

/// Filter and sort for order lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Only orders with this status; `None` means every status.
    pub status: Option<OrderStatus>,

    /// Case-insensitive match on the order id or any line's title.
    pub search: Option<String>,

    /// Result order.
    pub sort: OrderSort,
}

impl OrderQuery {
    /// Whether `order` passes the status and search filters.
    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|status| status != order.status) {
            return false;
        }

        let Some(needle) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
        else {
            return true;
        };

        let needle = needle.to_lowercase();

        order.id.to_string().contains(&needle)
            || order
                .lines
                .iter()
                .any(|line| line.title.to_lowercase().contains(&needle))
    }

    /// Filter then sort `orders`.
    pub fn apply<'o>(&self, orders: impl IntoIterator<Item = &'o Order>) -> Vec<&'o Order> {
        let mut found: Vec<&Order> = orders
            .into_iter()
            .filter(|order| self.matches(order))
            .collect();

        match self.sort {
            OrderSort::Newest => found.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at)),
            OrderSort::Oldest => found.sort_by_key(|order| order.ordered_at),
            OrderSort::PriceHighToLow => found.sort_by(|a, b| {
                b.total_price
                    .to_minor_units()
                    .cmp(&a.total_price.to_minor_units())
            }),
            OrderSort::PriceLowToHigh => {
                found.sort_by_key(|order| order.total_price.to_minor_units());
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use rusty_money::iso::VND;
    use testresult::TestResult;

    use crate::{
        fixtures::{order, payment, vnd},
        orders::{PaymentMethod, PaymentStatus},
    };

    use super::*;

    fn hours_ago(now: Timestamp, hours: i64) -> Result<Timestamp, jiff::Error> {
        now.checked_sub(SignedDuration::from_hours(hours))
    }

    #[test]
    fn join_keeps_latest_payment() -> TestResult {
        let now = Timestamp::now();
        let orders = vec![
            order(1, OrderStatus::Pending, now),
            order(2, OrderStatus::Pending, now),
        ];
        let payments = vec![
            payment(1, PaymentMethod::Momo, PaymentStatus::Failed, hours_ago(now, 2)?),
            payment(1, PaymentMethod::Cod, PaymentStatus::Pending, hours_ago(now, 1)?),
            payment(1, PaymentMethod::VnPay, PaymentStatus::Failed, hours_ago(now, 3)?),
        ];

        let joined = join(orders, payments);

        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined
                .first()
                .and_then(|entry| entry.payment.as_ref())
                .map(|payment| payment.method),
            Some(PaymentMethod::Cod)
        );
        assert!(joined.get(1).is_some_and(|entry| entry.payment.is_none()));

        Ok(())
    }

    #[test]
    fn counts_per_status() {
        let now = Timestamp::now();
        let orders = [
            order(1, OrderStatus::Pending, now),
            order(2, OrderStatus::Pending, now),
            order(3, OrderStatus::Delivered, now),
            order(4, OrderStatus::Cancelled, now),
        ];

        let counts = status_counts(&orders);

        assert_eq!(counts.get(OrderStatus::Pending), 2);
        assert_eq!(counts.get(OrderStatus::Shipping), 0);
        assert_eq!(counts.all(), 4);
    }

    #[test]
    fn spend_counts_only_delivered() -> TestResult {
        let now = Timestamp::now();
        let orders = [
            order(1, OrderStatus::Delivered, now),
            order(2, OrderStatus::Delivered, now),
            order(3, OrderStatus::Cancelled, now),
            order(4, OrderStatus::Shipping, now),
        ];

        assert_eq!(spend_total(&orders, VND)?, vnd(20_000));
        assert_eq!(seller_revenue(&orders, SellerId::new(10), VND)?, vnd(20_000));
        assert_eq!(seller_revenue(&orders, SellerId::new(99), VND)?, vnd(0));

        Ok(())
    }

    #[test]
    fn finds_cod_awaiting_confirmation() {
        let now = Timestamp::now();
        let joined = join(
            [
                order(1, OrderStatus::Delivered, now),
                order(2, OrderStatus::Delivered, now),
                order(3, OrderStatus::Shipping, now),
            ],
            [
                payment(1, PaymentMethod::Cod, PaymentStatus::Pending, now),
                payment(2, PaymentMethod::Cod, PaymentStatus::Success, now),
                payment(3, PaymentMethod::Cod, PaymentStatus::Pending, now),
            ],
        );

        let waiting: Vec<_> = awaiting_cod_confirmation(&joined)
            .map(|entry| entry.order.id)
            .collect();

        assert_eq!(waiting, vec![OrderId::new(1)]);
    }

    #[test]
    fn finds_stale_pending_orders() -> TestResult {
        let now = Timestamp::now();
        let joined = join(
            [
                order(1, OrderStatus::Pending, hours_ago(now, 48)?),
                order(2, OrderStatus::Pending, hours_ago(now, 48)?),
                order(3, OrderStatus::Pending, hours_ago(now, 25)?),
                order(4, OrderStatus::Confirmed, hours_ago(now, 48)?),
            ],
            [payment(2, PaymentMethod::Cod, PaymentStatus::Pending, hours_ago(now, 1)?)],
        );

        let stale: Vec<_> = stale_pending(&joined, now).map(|entry| entry.order.id).collect();

        assert_eq!(stale, vec![OrderId::new(1), OrderId::new(3)]);

        Ok(())
    }

    #[test]
    fn query_filters_and_sorts() -> TestResult {
        let now = Timestamp::now();
        let mut cheap = order(11, OrderStatus::Pending, hours_ago(now, 3)?);
        cheap.total_price = vnd(5_000);
        let mut dear = order(12, OrderStatus::Pending, hours_ago(now, 1)?);
        dear.total_price = vnd(50_000);
        if let Some(line) = dear.lines.first_mut() {
            line.title = "The Rust Programming Language".to_string();
        }
        let delivered = order(13, OrderStatus::Delivered, hours_ago(now, 2)?);
        let orders = [cheap, dear, delivered];

        let ids = |query: &OrderQuery| -> Vec<OrderId> {
            query.apply(&orders).into_iter().map(|order| order.id).collect()
        };

        assert_eq!(
            ids(&OrderQuery::default()),
            vec![OrderId::new(12), OrderId::new(13), OrderId::new(11)]
        );
        assert_eq!(
            ids(&OrderQuery {
                status: Some(OrderStatus::Pending),
                sort: OrderSort::PriceLowToHigh,
                ..OrderQuery::default()
            }),
            vec![OrderId::new(11), OrderId::new(12)]
        );
        assert_eq!(
            ids(&OrderQuery {
                search: Some("  rust ".to_string()),
                ..OrderQuery::default()
            }),
            vec![OrderId::new(12)]
        );
        assert_eq!(
            ids(&OrderQuery {
                search: Some("13".to_string()),
                sort: OrderSort::Oldest,
                ..OrderQuery::default()
            }),
            vec![OrderId::new(13)]
        );

        Ok(())
    }
}
