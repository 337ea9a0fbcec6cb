//! Order desk
//!
//! An [`OrderDesk`] is the order-side counterpart of a customer session: it sees the orders of
//! one customer, one seller or the whole store, drives lifecycle transitions through the single
//! transition table, confirms cash-on-delivery payments and keeps a polled cache of orders joined
//! with their payments for dashboards.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use jiff::Timestamp;
use quire::{
    ids::{CustomerId, OrderId, SellerId},
    money::StoreMoney,
    orders::{self, CodConfirmation, Order, OrderStatus, PaymentStatus, Role},
    reconcile::{self, OrderQuery, OrderWithPayment, StatusCounts},
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::{
    context::AppContext,
    errors::{EngineError, UpstreamError},
};

/// Whose orders a desk works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeskScope {
    /// Orders placed by one customer.
    Customer(CustomerId),

    /// Orders containing one seller's books.
    Seller(SellerId),

    /// Every order in the store.
    All,
}

impl DeskScope {
    /// The role the desk acts with.
    pub fn role(self) -> Role {
        match self {
            Self::Customer(_) => Role::Customer,
            Self::Seller(_) => Role::Seller,
            Self::All => Role::Admin,
        }
    }

    fn can_see(self, order: &Order) -> bool {
        match self {
            Self::Customer(customer) => order.customer == customer,
            Self::Seller(seller) => order.contains_seller(seller),
            Self::All => true,
        }
    }
}

/// Aggregates over the cached orders.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub counts: StatusCounts,

    /// Total price of delivered orders.
    pub spend: StoreMoney,

    /// The seller's line totals over delivered orders; only for seller desks.
    pub revenue: Option<StoreMoney>,

    /// Delivered orders whose COD payment has not been collected.
    pub awaiting_cod: Vec<OrderWithPayment>,

    /// Pending orders old enough for a seller to cancel.
    pub stale_pending: Vec<OrderWithPayment>,
}

/// Order operations for one customer, seller or admin.
#[derive(Debug)]
pub struct OrderDesk {
    context: AppContext,
    scope: DeskScope,
    cache: Mutex<Vec<OrderWithPayment>>,
}

impl OrderDesk {
    /// A desk with an empty cache; call [`OrderDesk::refresh`] to fill it.
    pub fn new(context: AppContext, scope: DeskScope) -> Self {
        Self {
            context,
            scope,
            cache: Mutex::new(Vec::new()),
        }
    }

    pub fn scope(&self) -> DeskScope {
        self.scope
    }

    /// Reload orders and payments. Returns how many orders are cached.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamFailure`] if either list cannot be loaded; the cache is
    /// left as it was.
    #[instrument(skip(self), fields(scope = ?self.scope))]
    pub async fn refresh(&self) -> Result<usize, EngineError> {
        let orders = &self.context.orders;
        let listing = async {
            match self.scope {
                DeskScope::Customer(customer) => orders.list_by_customer(customer).await,
                DeskScope::Seller(seller) => orders.list_by_seller(seller).await,
                DeskScope::All => orders.list_all().await,
            }
        };

        let (orders, payments) = tokio::try_join!(
            self.context.call(listing),
            self.context.call(self.context.payments.list_all())
        )?;

        let scope = self.scope;
        let joined = reconcile::join(
            orders.into_iter().filter(|order| scope.can_see(order)),
            payments,
        );
        let count = joined.len();

        *self.lock_cache() = joined;
        debug!(count, "refreshed orders");

        Ok(count)
    }

    /// The cached orders with their payments.
    pub fn snapshot(&self) -> Vec<OrderWithPayment> {
        self.lock_cache().clone()
    }

    /// Cached orders matching `query`, in the query's order.
    pub fn query(&self, query: &OrderQuery) -> Vec<OrderWithPayment> {
        let cache = self.lock_cache();
        let by_id: FxHashMap<OrderId, &OrderWithPayment> =
            cache.iter().map(|entry| (entry.order.id, entry)).collect();

        query
            .apply(cache.iter().map(|entry| &entry.order))
            .into_iter()
            .filter_map(|order| by_id.get(&order.id).map(|entry| (*entry).clone()))
            .collect()
    }

    /// Aggregate the cached orders.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] on overflow or a currency mismatch.
    pub fn dashboard(&self, now: Timestamp) -> Result<Dashboard, EngineError> {
        let cache = self.lock_cache();
        let orders = || cache.iter().map(|entry| &entry.order);
        let currency = self.context.currency;

        let revenue = match self.scope {
            DeskScope::Seller(seller) => {
                Some(reconcile::seller_revenue(orders(), seller, currency)?)
            }
            DeskScope::Customer(_) | DeskScope::All => None,
        };

        Ok(Dashboard {
            counts: reconcile::status_counts(orders()),
            spend: reconcile::spend_total(orders(), currency)?,
            revenue,
            awaiting_cod: reconcile::awaiting_cod_confirmation(&cache)
                .cloned()
                .collect(),
            stale_pending: reconcile::stale_pending(&cache, now).cloned().collect(),
        })
    }

    /// Statuses this desk may move an order to right now.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamFailure`] if the order cannot be loaded or is outside the
    /// desk's scope.
    pub async fn allowed(&self, order: OrderId) -> Result<SmallVec<[OrderStatus; 2]>, EngineError> {
        let entry = self.load(order).await?;

        Ok(orders::allowed_transitions(
            &entry.order,
            entry.payment.as_ref(),
            self.scope.role(),
            self.context.clock.now(),
        ))
    }

    /// Move an order to `to`, checking the transition table before telling the backend.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalTransition`] for moves this desk may not make (nothing is
    /// sent to the backend) and [`EngineError::UpstreamFailure`] when loading or updating fails.
    #[instrument(skip(self), fields(scope = ?self.scope))]
    pub async fn transition(&self, order: OrderId, to: OrderStatus) -> Result<Order, EngineError> {
        let entry = self.load(order).await?;
        let role = self.scope.role();

        let transition = orders::transition(
            &entry.order,
            entry.payment.as_ref(),
            to,
            role,
            self.context.clock.now(),
        )?;

        let store = &self.context.orders;
        let updated = if to == OrderStatus::Cancelled {
            self.context.call(store.cancel(order)).await?
        } else {
            self.context.call(store.update_status(order, to)).await?
        };

        info!(
            %order,
            from = %transition.from,
            to = %transition.to,
            %role,
            "moved order"
        );

        self.update_cached(|entry| {
            if entry.order.id == order {
                entry.order = updated.clone();
            }
        });

        Ok(updated)
    }

    /// Record that a delivered order's cash on delivery was collected. Confirming twice is a
    /// no-op that reports [`CodConfirmation::AlreadyConfirmed`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Payment`] when the payment cannot be confirmed by this desk, and
    /// [`EngineError::UpstreamFailure`] when the order has no payment or the backend fails.
    #[instrument(skip(self), fields(scope = ?self.scope))]
    pub async fn confirm_cod(&self, order: OrderId) -> Result<CodConfirmation, EngineError> {
        let entry = self.load(order).await?;
        let mut payment = entry
            .payment
            .ok_or_else(|| UpstreamError::NotFound(format!("payment for order {order}")))?;

        let outcome = orders::confirm_cod(&entry.order, &mut payment, self.scope.role())?;

        if outcome == CodConfirmation::AlreadyConfirmed {
            debug!(%order, payment = %payment.id, "cod payment already confirmed");
            return Ok(outcome);
        }

        let stored = self
            .context
            .call(
                self.context
                    .payments
                    .update_status(payment.id, PaymentStatus::Success),
            )
            .await?;

        info!(%order, payment = %stored.id, "confirmed cod payment");

        self.update_cached(|entry| {
            if entry.order.id == order {
                entry.payment = Some(stored.clone());
            }
        });

        Ok(outcome)
    }

    /// Refresh every `interval` until `shutdown` resolves, handing each fresh snapshot to
    /// `on_refresh`. Failed refreshes are logged and retried on the next tick.
    pub async fn poll(
        &self,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
        mut on_refresh: impl FnMut(&[OrderWithPayment]),
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!("stopped polling orders");
                    return;
                }
                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(_) => on_refresh(&self.snapshot()),
                        Err(error) => warn!(%error, "failed to refresh orders"),
                    }
                }
            }
        }
    }

    async fn load(&self, order: OrderId) -> Result<OrderWithPayment, EngineError> {
        let (found, payments) = tokio::try_join!(
            self.context.call(self.context.orders.get(order)),
            self.context.call(self.context.payments.list_all())
        )?;

        if !self.scope.can_see(&found) {
            return Err(UpstreamError::NotFound(format!("order {order}")).into());
        }

        reconcile::join([found], payments)
            .pop()
            .ok_or_else(|| UpstreamError::NotFound(format!("order {order}")).into())
    }

    fn lock_cache(&self) -> MutexGuard<'_, Vec<OrderWithPayment>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_cached(&self, update: impl FnMut(&mut OrderWithPayment)) {
        self.lock_cache().iter_mut().for_each(update);
    }
}
