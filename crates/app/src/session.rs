//! Customer sessions
//!
//! A [`CustomerSession`] owns one customer's cart, checkout selection and applied voucher from
//! login to logout. Cart mutations are optimistic: the local cart changes first, the backend is
//! told, and the change is committed or rolled back once it answers. A committed change is
//! checked against a fresh copy of the backend cart. Mutations to the same book queue behind a
//! per-book async lock; different books proceed independently. Checkout takes the locks of every
//! selected book, so it only ever freezes quantities the backend has settled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jiff::Timestamp;
use quire::{
    cart::{Cart, CartError, LineChange, PendingChange},
    checkout::{self, CheckoutDraft},
    discounts::{Discount, DiscountTotals, VoucherSlot, best_discount},
    errors::ValidationError,
    ids::{BookId, CustomerId},
    orders::{Order, Payment, PaymentMethod},
};
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::{
    collaborators::{NewOrder, NewPayment},
    context::AppContext,
    errors::{EngineError, UpstreamError},
};

/// An order created from the cart together with its payment record.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub payment: Payment,
    pub draft: CheckoutDraft,
}

#[derive(Debug)]
struct SessionState {
    cart: Cart,
    voucher: VoucherSlot,
    eligible: Vec<Discount>,
}

/// What the backend has to be told about a local line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteChange {
    Add(i32),
    Remove,
    Nothing,
}

impl RemoteChange {
    fn of(change: LineChange) -> Result<Self, ValidationError> {
        match change {
            LineChange::Added(quantity) => i32::try_from(quantity.get()).map(Self::Add),
            LineChange::Updated { from, to } => {
                i32::try_from(i64::from(to.get()) - i64::from(from.get())).map(Self::Add)
            }
            LineChange::Removed(_) => Ok(Self::Remove),
            LineChange::Unchanged => Ok(Self::Nothing),
        }
        .map_err(|_overflow| ValidationError::QuantityOverflow)
    }
}

/// Per-book async locks. An entry only lives while someone holds or waits on it.
#[derive(Debug, Default)]
struct BookLocks(Mutex<FxHashMap<BookId, Arc<AsyncMutex<()>>>>);

impl BookLocks {
    async fn hold(&self, book: BookId) -> HeldBook<'_> {
        let lock = self.entries().entry(book).or_default().clone();
        let guard = lock.lock_owned().await;

        HeldBook {
            locks: self,
            book,
            guard: Some(guard),
        }
    }

    /// Take several locks in ascending book order so two holders can never deadlock.
    async fn hold_all(&self, books: impl IntoIterator<Item = BookId>) -> Vec<HeldBook<'_>> {
        let mut books: Vec<BookId> = books.into_iter().collect();
        books.sort_unstable();
        books.dedup();

        let mut held = Vec::with_capacity(books.len());

        for book in books {
            held.push(self.hold(book).await);
        }

        held
    }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<BookId, Arc<AsyncMutex<()>>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct HeldBook<'l> {
    locks: &'l BookLocks,
    book: BookId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldBook<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut entries = self.locks.entries();
        let idle = entries
            .get(&self.book)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);

        if idle {
            entries.remove(&self.book);
        }
    }
}

/// One logged-in customer's cart engine.
#[derive(Debug)]
pub struct CustomerSession {
    context: AppContext,
    customer: CustomerId,
    state: Mutex<SessionState>,
    locks: BookLocks,
}

impl CustomerSession {
    /// Start a session and load the customer's cart.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamFailure`] if the cart cannot be loaded.
    #[instrument(skip(context))]
    pub async fn open(context: AppContext, customer: CustomerId) -> Result<Self, EngineError> {
        let session = Self {
            state: Mutex::new(SessionState {
                cart: Cart::new(customer, context.currency),
                voucher: VoucherSlot::new(),
                eligible: Vec::new(),
            }),
            locks: BookLocks::default(),
            context,
            customer,
        };

        session.refresh().await?;

        Ok(session)
    }

    pub fn customer(&self) -> CustomerId {
        self.customer
    }

    /// A copy of the cart as it stands locally.
    pub fn cart(&self) -> Cart {
        self.lock_state().cart.clone()
    }

    pub fn applied_voucher(&self) -> Option<Discount> {
        self.lock_state().voucher.applied().cloned()
    }

    /// Vouchers fetched by the last [`CustomerSession::fetch_eligible`].
    pub fn eligible_vouchers(&self) -> Vec<Discount> {
        self.lock_state().eligible.clone()
    }

    /// Replace the local cart with the backend's view. Selections of books still in the cart
    /// survive.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamFailure`] if the cart cannot be loaded, or
    /// [`EngineError::Validation`] if it is priced in another currency.
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn refresh(&self) -> Result<(), EngineError> {
        let lines = self
            .context
            .call(self.context.carts.get_cart(self.customer))
            .await?;

        let mut guard = self.lock_state();
        let state = &mut *guard;

        state.cart.replace_lines(lines)?;
        debug!(lines = state.cart.len(), "loaded cart");
        self.revalidate_voucher(state);

        Ok(())
    }

    /// Add `delta` copies of a book, creating the line if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamFailure`] if the book cannot be looked up or the backend
    /// call fails, and [`EngineError::ConcurrencyConflict`] if the backend rejects the change.
    /// The cart is rolled back before any error is returned.
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn add_book(&self, book: BookId, delta: i32) -> Result<LineChange, EngineError> {
        let details = self.context.call(self.context.catalog.get_book(book)).await?;
        let line = details.to_cart_line();

        self.mutate(book, move |cart| cart.begin_add(line, delta))
            .await
    }

    /// Change the quantity of a line by `delta`. Dropping to zero or below removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotInCart`] for a book without a line, otherwise as
    /// [`CustomerSession::add_book`].
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn update_quantity(
        &self,
        book: BookId,
        delta: i32,
    ) -> Result<LineChange, EngineError> {
        self.mutate(book, move |cart| cart.begin_quantity_change(book, delta))
            .await
    }

    /// Remove a line. Removing a book that is not in the cart does nothing.
    ///
    /// # Errors
    ///
    /// As [`CustomerSession::add_book`].
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn remove(&self, book: BookId) -> Result<LineChange, EngineError> {
        self.mutate(book, move |cart| cart.begin_remove(book)).await
    }

    /// Flip a book in or out of the checkout selection. Returns whether it is now selected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotInCart`] for a book without a line.
    pub fn toggle_selected(&self, book: BookId) -> Result<bool, EngineError> {
        self.with_selection(|cart| cart.toggle_selected(book))
    }

    pub fn select_all(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        state.cart.select_all();
        self.revalidate_voucher(state);
    }

    pub fn clear_selection(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        state.cart.clear_selection();
        self.revalidate_voucher(state);
    }

    /// Ask the backend which vouchers fit the current selection. The first selected book stands
    /// in for the selection; nothing selected means nothing is eligible.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UpstreamFailure`] if the backend call fails.
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn fetch_eligible(&self) -> Result<Vec<Discount>, EngineError> {
        let query = {
            let state = self.lock_state();
            let representative = state.cart.selected_lines().next().map(|line| line.book);

            match representative {
                Some(book) => Some((book, state.cart.selected_subtotal()?)),
                None => None,
            }
        };

        let eligible = match query {
            Some((book, value)) => {
                self.context.call(
                    self.context
                        .discounts
                        .list_eligible(self.customer, book, value),
                )
                .await?
            }
            None => Vec::new(),
        };

        debug!(count = eligible.len(), "fetched eligible vouchers");
        self.lock_state().eligible.clone_from(&eligible);

        Ok(eligible)
    }

    /// Apply a voucher by code to the current selection, replacing any applied voucher.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IneligibleDiscount`] when no eligible voucher has that code or it
    /// does not qualify. The applied voucher is left as it was.
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn apply_voucher(&self, code: &str) -> Result<Discount, EngineError> {
        self.fetch_eligible().await?;

        let now = self.context.clock.now();
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let applied = state
            .voucher
            .apply_code(code, &state.eligible, &state.cart, now)?
            .clone();

        info!(code = %applied.code(), "applied voucher");

        Ok(applied)
    }

    pub fn remove_voucher(&self) -> Option<Discount> {
        self.lock_state().voucher.clear()
    }

    /// Totals of the current selection with the applied voucher.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] on overflow.
    pub fn totals(&self) -> Result<DiscountTotals, EngineError> {
        let state = self.lock_state();

        Ok(state.voucher.totals(&state.cart)?)
    }

    /// The fetched voucher that saves the most on the current selection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] on overflow.
    pub fn best_voucher(&self) -> Result<Option<Discount>, EngineError> {
        let now = self.context.clock.now();
        let state = self.lock_state();
        let value = state.cart.selected_subtotal()?;

        Ok(best_discount(&state.eligible, &value, now)?.cloned())
    }

    /// Turn the selection into an order paid with `method`.
    ///
    /// Waits for pending changes to the selected books to settle, then holds their locks until
    /// the order is placed. The order and payment record are created first; recording voucher
    /// use and removing the ordered lines from the backend cart are best effort and only logged
    /// on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an empty selection,
    /// [`EngineError::IneligibleDiscount`] when the applied voucher no longer qualifies,
    /// [`EngineError::ConcurrencyConflict`] when a book joined the selection with a change still
    /// pending, and [`EngineError::UpstreamFailure`] when the order or payment cannot be created.
    #[instrument(skip(self), fields(customer = %self.customer))]
    pub async fn checkout(&self, method: PaymentMethod) -> Result<PlacedOrder, EngineError> {
        let selected: Vec<BookId> = self.lock_state().cart.selection().iter().collect();
        let _held = self.locks.hold_all(selected).await;

        let now = self.context.clock.now();
        let (draft, voucher) = {
            let state = self.lock_state();
            let voucher = state.voucher.applied().cloned();
            let draft = checkout::freeze(&state.cart, voucher.as_ref(), now)?;

            if let Some(book) = draft.books().find(|&book| state.cart.is_in_flight(book)) {
                return Err(CartError::MutationInFlight(book).into());
            }

            (draft, voucher)
        };

        let order = self
            .context
            .call(self.context.orders.create(NewOrder::from(&draft)))
            .await?;

        let payment = self
            .context
            .call(self.context.payments.create(NewPayment {
                order: order.id,
                method,
                amount: draft.totals.discounted,
                discount: draft.totals.saved,
            }))
            .await?;

        if let Some(discount) = &voucher {
            let marked = self
                .context
                .call(self.context.discounts.mark_used(discount.id(), self.customer))
                .await;

            if let Err(error) = marked {
                warn!(code = %discount.code(), %error, "failed to record voucher use");
            }
        }

        for book in draft.books() {
            let removed = self
                .context
                .call(self.context.carts.remove_item(self.customer, book))
                .await;

            if let Err(error) = removed {
                warn!(%book, %error, "failed to remove ordered book from backend cart");
            }
        }

        {
            let mut state = self.lock_state();

            for book in draft.books() {
                state.cart.remove(book);
            }

            state.voucher.clear();
            state.eligible.clear();
        }

        info!(
            order = %order.id,
            %method,
            total = %draft.totals.discounted,
            "placed order"
        );

        Ok(PlacedOrder {
            order,
            payment,
            draft,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn mutate(
        &self,
        book: BookId,
        begin: impl FnOnce(&mut Cart) -> Result<PendingChange, CartError>,
    ) -> Result<LineChange, EngineError> {
        let _held = self.locks.hold(book).await;

        let pending = begin(&mut self.lock_state().cart)?;
        let change = pending.change();

        debug!(%book, ?change, "applied local cart change");

        let pushed = match RemoteChange::of(change) {
            Ok(remote) => self
                .push(book, remote)
                .await
                .map_err(|error| EngineError::from_mutation(book, error)),
            Err(error) => Err(error.into()),
        };

        match pushed {
            Ok(()) => {
                self.lock_state().cart.commit(pending);
                self.confirm_line(book).await;

                Ok(change)
            }
            Err(error) => {
                self.lock_state().cart.rollback(pending);
                warn!(%book, %error, "rolled back cart change");

                Err(error)
            }
        }
    }

    /// Re-read the backend cart and take its word for `book`. If the read fails the committed
    /// local line stays.
    async fn confirm_line(&self, book: BookId) {
        let fetched = self
            .context
            .call(self.context.carts.get_cart(self.customer))
            .await;

        let mut guard = self.lock_state();
        let state = &mut *guard;

        let reconciled = match fetched {
            Ok(lines) => state
                .cart
                .reconcile_line(book, &lines)
                .map_err(EngineError::from),
            Err(error) => Err(error.into()),
        };

        match reconciled {
            Ok(true) => debug!(%book, "confirmed cart line"),
            Ok(false) => {}
            Err(error) => warn!(%book, %error, "could not confirm cart line"),
        }

        self.revalidate_voucher(state);
    }

    async fn push(&self, book: BookId, change: RemoteChange) -> Result<(), UpstreamError> {
        let carts = &self.context.carts;

        match change {
            RemoteChange::Add(delta) => {
                self.context.call(carts.add_item(self.customer, book, delta)).await
            }
            RemoteChange::Remove => self.context.call(carts.remove_item(self.customer, book)).await,
            RemoteChange::Nothing => Ok(()),
        }
    }

    fn with_selection<T>(
        &self,
        change: impl FnOnce(&mut Cart) -> Result<T, CartError>,
    ) -> Result<T, EngineError> {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let result = change(&mut state.cart)?;

        self.revalidate_voucher(state);

        Ok(result)
    }

    fn revalidate_voucher(&self, state: &mut SessionState) {
        let now: Timestamp = self.context.clock.now();

        if let Some((dropped, reason)) = state.voucher.revalidate(&state.cart, now) {
            info!(code = %dropped.code(), %reason, "dropped voucher that no longer qualifies");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use jiff::SignedDuration;
    use mockall::predicate::eq;
    use quire::{
        cart::CartLine,
        discounts::{DiscountCode, DiscountValue, IneligibleDiscount, NewDiscount},
        ids::{DiscountId, OrderId},
        money::Quantity,
        orders::{OrderStatus, PaymentStatus},
    };
    use rusty_money::iso::VND;
    use testresult::TestResult;

    use crate::{
        clock::FixedClock,
        collaborators::CartStore,
        test_helpers::{
            CUSTOMER, Mocks, book, cart_line, now, order, payment, percentage_voucher, vnd,
        },
    };

    use super::*;

    const BOOK_1: BookId = BookId::new(1);
    const BOOK_2: BookId = BookId::new(2);

    /// `{book1: 2 @ 10_000, book2: 1 @ 20_000}`
    fn two_book_cart(mocks: &mut Mocks) {
        mocks
            .carts
            .expect_get_cart()
            .once()
            .with(eq(CUSTOMER))
            .return_once(|_| Ok(vec![cart_line(1, 10_000, 2), cart_line(2, 20_000, 1)]));
    }

    /// Serves `views` in turn, one per cart read.
    fn serve_carts(mocks: &mut Mocks, views: Vec<Vec<CartLine>>) {
        let count = views.len();
        let mut views = views.into_iter();

        mocks
            .carts
            .expect_get_cart()
            .times(count)
            .with(eq(CUSTOMER))
            .returning(move |_| Ok(views.next().unwrap_or_default()));
    }

    async fn open(mocks: Mocks) -> Result<CustomerSession, EngineError> {
        let clock = Arc::new(FixedClock::new(now()));

        CustomerSession::open(mocks.into_context(clock), CUSTOMER).await
    }

    #[tokio::test]
    async fn open_loads_backend_cart() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);

        let session = open(mocks).await?;
        let cart = session.cart();

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.item_count(), 3);
        assert!(cart.selection().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn adding_a_new_book_sends_the_quantity() -> TestResult {
        let mut mocks = Mocks::default();
        serve_carts(&mut mocks, vec![Vec::new(), vec![cart_line(3, 15_000, 2)]]);
        mocks
            .catalog
            .expect_get_book()
            .once()
            .with(eq(BookId::new(3)))
            .return_once(|_| Ok(book(3, 15_000)));
        mocks
            .carts
            .expect_add_item()
            .once()
            .with(eq(CUSTOMER), eq(BookId::new(3)), eq(2))
            .return_once(|_, _, _| Ok(()));

        let session = open(mocks).await?;
        let change = session.add_book(BookId::new(3), 2).await?;

        assert_eq!(change, LineChange::Added(Quantity::new(2)?));
        assert_eq!(
            session.cart().line(BookId::new(3)).map(|line| line.quantity.get()),
            Some(2)
        );

        Ok(())
    }

    #[tokio::test]
    async fn incrementing_sends_the_delta() -> TestResult {
        let mut mocks = Mocks::default();
        serve_carts(
            &mut mocks,
            vec![
                vec![cart_line(1, 10_000, 2), cart_line(2, 20_000, 1)],
                vec![cart_line(1, 10_000, 3), cart_line(2, 20_000, 1)],
            ],
        );
        mocks
            .carts
            .expect_add_item()
            .once()
            .with(eq(CUSTOMER), eq(BOOK_1), eq(1))
            .return_once(|_, _, _| Ok(()));

        let session = open(mocks).await?;
        session.update_quantity(BOOK_1, 1).await?;

        assert_eq!(
            session.cart().line(BOOK_1).map(|line| line.quantity.get()),
            Some(3)
        );
        assert!(session.locks.entries().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn decrementing_the_last_copy_removes_the_line() -> TestResult {
        let mut mocks = Mocks::default();
        serve_carts(
            &mut mocks,
            vec![
                vec![cart_line(1, 10_000, 2), cart_line(2, 20_000, 1)],
                vec![cart_line(1, 10_000, 2)],
            ],
        );
        mocks.carts.expect_add_item().never();
        mocks
            .carts
            .expect_remove_item()
            .once()
            .with(eq(CUSTOMER), eq(BOOK_2))
            .return_once(|_, _| Ok(()));

        let session = open(mocks).await?;
        let change = session.update_quantity(BOOK_2, -1).await?;

        assert_eq!(change, LineChange::Removed(Quantity::ONE));
        assert!(session.cart().line(BOOK_2).is_none());

        Ok(())
    }

    #[tokio::test]
    async fn backend_quantity_wins_after_confirmation() -> TestResult {
        let mut mocks = Mocks::default();
        serve_carts(
            &mut mocks,
            vec![
                vec![cart_line(1, 10_000, 2), cart_line(2, 20_000, 1)],
                vec![cart_line(1, 10_000, 4), cart_line(2, 20_000, 1)],
            ],
        );
        mocks
            .carts
            .expect_add_item()
            .once()
            .with(eq(CUSTOMER), eq(BOOK_1), eq(3))
            .return_once(|_, _, _| Ok(()));

        let session = open(mocks).await?;
        let change = session.update_quantity(BOOK_1, 3).await?;

        assert_eq!(
            change,
            LineChange::Updated {
                from: Quantity::new(2)?,
                to: Quantity::new(5)?
            }
        );
        assert_eq!(
            session.cart().line(BOOK_1).map(|line| line.quantity.get()),
            Some(4)
        );

        Ok(())
    }

    #[tokio::test]
    async fn failed_confirmation_read_keeps_the_committed_line() -> TestResult {
        let mut mocks = Mocks::default();
        let mut reads = 0;
        mocks
            .carts
            .expect_get_cart()
            .times(2)
            .returning(move |_| {
                reads += 1;

                if reads == 1 {
                    Ok(vec![cart_line(1, 10_000, 2), cart_line(2, 20_000, 1)])
                } else {
                    Err(UpstreamError::Transport("connection reset".to_string()))
                }
            });
        mocks
            .carts
            .expect_add_item()
            .once()
            .return_once(|_, _, _| Ok(()));

        let session = open(mocks).await?;
        session.update_quantity(BOOK_1, 1).await?;

        assert_eq!(
            session.cart().line(BOOK_1).map(|line| line.quantity.get()),
            Some(3)
        );
        assert!(!session.cart().is_in_flight(BOOK_1));

        Ok(())
    }

    #[tokio::test]
    async fn rejected_change_is_rolled_back() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks.carts.expect_add_item().once().return_once(|_, _, _| {
            Err(UpstreamError::Rejected {
                status: 400,
                message: "not enough stock".to_string(),
            })
        });

        let session = open(mocks).await?;
        session.toggle_selected(BOOK_1)?;
        let before = session.cart();

        let result = session.update_quantity(BOOK_1, 5).await;

        assert!(matches!(
            result,
            Err(EngineError::ConcurrencyConflict { book, .. }) if book == BOOK_1
        ));

        let after = session.cart();
        assert_eq!(after.lines(), before.lines());
        assert!(after.selection().contains(BOOK_1));
        assert!(!after.is_in_flight(BOOK_1));

        Ok(())
    }

    #[tokio::test]
    async fn failed_removal_restores_line_and_selection() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .carts
            .expect_remove_item()
            .once()
            .return_once(|_, _| Err(UpstreamError::Transport("connection reset".to_string())));

        let session = open(mocks).await?;
        session.select_all();
        let before = session.cart();

        let result = session.remove(BOOK_1).await;

        assert!(matches!(
            result,
            Err(EngineError::UpstreamFailure(UpstreamError::Transport(_)))
        ));
        assert_eq!(session.cart().lines(), before.lines());
        assert!(session.cart().selection().contains(BOOK_1));

        Ok(())
    }

    /// Backend cart kept in memory. Changes to `slow` wait `delay` before answering, and the
    /// first `rejections` changes are refused.
    struct FakeCart {
        lines: Mutex<Vec<(u64, i64, u32)>>,
        slow: BookId,
        delay: Duration,
        rejections: AtomicUsize,
        events: Mutex<Vec<String>>,
    }

    impl FakeCart {
        fn new(slow: BookId, delay: Duration, rejections: usize) -> Arc<Self> {
            Arc::new(Self {
                lines: Mutex::new(vec![(1, 10_000, 2), (2, 20_000, 1)]),
                slow,
                delay,
                rejections: AtomicUsize::new(rejections),
                events: Mutex::new(Vec::new()),
            })
        }

        fn lines(&self) -> MutexGuard<'_, Vec<(u64, i64, u32)>> {
            self.lines.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn events(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn record(&self, event: String) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }

        fn quantity(&self, book: BookId) -> Option<u32> {
            self.lines()
                .iter()
                .find(|&&(id, _, _)| id == book.get())
                .map(|&(_, _, quantity)| quantity)
        }
    }

    #[async_trait]
    impl CartStore for FakeCart {
        async fn get_cart(&self, _customer: CustomerId) -> Result<Vec<CartLine>, UpstreamError> {
            Ok(self
                .lines()
                .iter()
                .map(|&(id, price, quantity)| cart_line(id, price, quantity))
                .collect())
        }

        async fn add_item(
            &self,
            _customer: CustomerId,
            book: BookId,
            delta: i32,
        ) -> Result<(), UpstreamError> {
            self.record(format!("start {book} {delta:+}"));

            if book == self.slow {
                tokio::time::sleep(self.delay).await;
            }

            let rejected = self
                .rejections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();

            self.record(format!("end {book} {delta:+}"));

            if rejected {
                return Err(UpstreamError::Rejected {
                    status: 409,
                    message: "stale quantity".to_string(),
                });
            }

            let mut lines = self.lines();

            match lines.iter_mut().find(|(id, _, _)| *id == book.get()) {
                Some(line) => line.2 = line.2.saturating_add_signed(delta),
                None => lines.push((book.get(), 10_000, u32::try_from(delta).unwrap_or(0))),
            }

            lines.retain(|&(_, _, quantity)| quantity > 0);

            Ok(())
        }

        async fn remove_item(
            &self,
            _customer: CustomerId,
            book: BookId,
        ) -> Result<(), UpstreamError> {
            self.lines().retain(|&(id, _, _)| id != book.get());

            Ok(())
        }
    }

    fn fake_context(cart: &Arc<FakeCart>, mocks: Mocks, timeout: Duration) -> AppContext {
        let mut context = mocks.into_context(Arc::new(FixedClock::new(now())));
        context.carts = cart.clone();
        context.request_timeout = timeout;

        context
    }

    #[tokio::test]
    async fn timed_out_change_is_rolled_back_without_touching_other_books() -> TestResult {
        let cart = FakeCart::new(BOOK_1, Duration::from_secs(5), 0);
        let context = fake_context(&cart, Mocks::default(), Duration::from_millis(50));

        let session = CustomerSession::open(context, CUSTOMER).await?;

        let (slow, fast) = tokio::join!(
            session.update_quantity(BOOK_1, 1),
            session.update_quantity(BOOK_2, 2)
        );

        assert!(matches!(
            slow,
            Err(EngineError::UpstreamFailure(UpstreamError::Timeout))
        ));
        assert!(fast.is_ok());

        let local = session.cart();
        assert_eq!(local.line(BOOK_1).map(|line| line.quantity.get()), Some(2));
        assert_eq!(local.line(BOOK_2).map(|line| line.quantity.get()), Some(3));
        assert!(session.locks.entries().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn changes_to_one_book_run_one_after_another() -> TestResult {
        let cart = FakeCart::new(BOOK_1, Duration::from_millis(50), 0);
        let context = fake_context(&cart, Mocks::default(), Duration::from_secs(1));

        let session = CustomerSession::open(context, CUSTOMER).await?;

        let (first, second) = tokio::join!(
            session.update_quantity(BOOK_1, 1),
            session.update_quantity(BOOK_1, 2)
        );

        assert!(matches!(
            first,
            Ok(LineChange::Updated { from, to }) if from.get() == 2 && to.get() == 3
        ));
        assert!(matches!(
            second,
            Ok(LineChange::Updated { from, to }) if from.get() == 3 && to.get() == 5
        ));
        assert_eq!(
            cart.events(),
            vec!["start 1 +1", "end 1 +1", "start 1 +2", "end 1 +2"]
        );
        assert_eq!(
            session.cart().line(BOOK_1).map(|line| line.quantity.get()),
            Some(5)
        );
        assert_eq!(cart.quantity(BOOK_1), Some(5));
        assert!(session.locks.entries().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn queued_change_starts_from_the_rolled_back_line() -> TestResult {
        let cart = FakeCart::new(BOOK_1, Duration::from_millis(50), 1);
        let context = fake_context(&cart, Mocks::default(), Duration::from_secs(1));

        let session = CustomerSession::open(context, CUSTOMER).await?;

        let (first, second) = tokio::join!(
            session.update_quantity(BOOK_1, 3),
            session.update_quantity(BOOK_1, 2)
        );

        assert!(matches!(
            first,
            Err(EngineError::ConcurrencyConflict { book, .. }) if book == BOOK_1
        ));
        assert!(matches!(
            second,
            Ok(LineChange::Updated { from, to }) if from.get() == 2 && to.get() == 4
        ));
        assert_eq!(
            session.cart().line(BOOK_1).map(|line| line.quantity.get()),
            Some(4)
        );
        assert_eq!(cart.quantity(BOOK_1), Some(4));

        Ok(())
    }

    #[tokio::test]
    async fn checkout_waits_for_pending_change_to_settle() -> TestResult {
        let cart = FakeCart::new(BOOK_1, Duration::from_millis(100), 1);
        let mut mocks = Mocks::default();
        mocks
            .orders
            .expect_create()
            .once()
            .withf(|request| {
                request.items.len() == 1
                    && request
                        .items
                        .iter()
                        .all(|item| item.book == BOOK_1 && item.quantity.get() == 2)
            })
            .return_once(|_| Ok(order(100, OrderStatus::Pending, &[(1, 10_000, 2)])));
        mocks
            .payments
            .expect_create()
            .once()
            .withf(|request| request.amount == vnd(20_000))
            .return_once(|_| {
                Ok(payment(
                    1,
                    100,
                    PaymentMethod::Cod,
                    PaymentStatus::Pending,
                    now(),
                ))
            });
        let context = fake_context(&cart, mocks, Duration::from_secs(1));

        let session = CustomerSession::open(context, CUSTOMER).await?;
        session.toggle_selected(BOOK_1)?;

        let (update, placed) = tokio::join!(session.update_quantity(BOOK_1, 3), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.checkout(PaymentMethod::Cod).await
        });

        assert!(matches!(
            update,
            Err(EngineError::ConcurrencyConflict { book, .. }) if book == BOOK_1
        ));

        let placed = placed?;
        let frozen: Vec<u32> = placed
            .draft
            .items
            .iter()
            .map(|item| item.quantity.get())
            .collect();
        assert_eq!(frozen, vec![2]);

        assert!(session.cart().line(BOOK_1).is_none());
        assert_eq!(cart.quantity(BOOK_1), None);
        assert!(session.locks.entries().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn voucher_prices_the_partial_selection() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .discounts
            .expect_list_eligible()
            .once()
            .with(eq(CUSTOMER), eq(BOOK_1), eq(vnd(20_000)))
            .return_once(|_, _, _| Ok(vec![percentage_voucher("SALE10", 10, 5_000)]));

        let session = open(mocks).await?;
        session.toggle_selected(BOOK_1)?;

        let applied = session.apply_voucher("sale10").await?;
        let totals = session.totals()?;

        assert_eq!(applied.code().as_str(), "SALE10");
        assert_eq!(totals.original, vnd(20_000));
        assert_eq!(totals.saved, vnd(2_000));
        assert_eq!(totals.discounted, vnd(18_000));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_code_leaves_applied_voucher_alone() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .discounts
            .expect_list_eligible()
            .times(2)
            .returning(|_, _, _| Ok(vec![percentage_voucher("SALE10", 10, 0)]));

        let session = open(mocks).await?;
        session.select_all();
        session.apply_voucher("SALE10").await?;

        let result = session.apply_voucher("nope").await;

        assert!(matches!(
            result,
            Err(EngineError::IneligibleDiscount(IneligibleDiscount::NotFound(code))) if code == "NOPE"
        ));
        assert_eq!(
            session.applied_voucher().map(|voucher| voucher.code().to_string()),
            Some("SALE10".to_string())
        );

        Ok(())
    }

    #[tokio::test]
    async fn deselecting_below_the_minimum_drops_the_voucher() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .discounts
            .expect_list_eligible()
            .once()
            .return_once(|_, _, _| Ok(vec![percentage_voucher("BIG", 10, 30_000)]));

        let session = open(mocks).await?;
        session.select_all();
        session.apply_voucher("BIG").await?;

        session.toggle_selected(BOOK_2)?;

        assert!(session.applied_voucher().is_none());
        assert_eq!(session.totals()?.saved, vnd(0));

        Ok(())
    }

    #[tokio::test]
    async fn nothing_selected_means_nothing_eligible() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks.discounts.expect_list_eligible().never();

        let session = open(mocks).await?;

        assert!(session.fetch_eligible().await?.is_empty());
        assert!(session.best_voucher()?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn checkout_places_order_and_clears_ordered_lines() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .discounts
            .expect_list_eligible()
            .once()
            .return_once(|_, _, _| Ok(vec![percentage_voucher("SALE10", 10, 5_000)]));
        mocks
            .orders
            .expect_create()
            .once()
            .withf(|request| {
                request.customer == CUSTOMER
                    && request.items.len() == 1
                    && request.items.iter().all(|item| {
                        item.book == BOOK_1
                            && item.discount_code.as_ref().map(|code| code.as_str()) == Some("SALE10")
                    })
            })
            .return_once(|_| Ok(order(100, OrderStatus::Pending, &[(1, 10_000, 2)])));
        mocks
            .payments
            .expect_create()
            .once()
            .withf(|request| {
                request.order == OrderId::new(100)
                    && request.method == PaymentMethod::Cod
                    && request.amount == vnd(18_000)
                    && request.discount == vnd(2_000)
            })
            .return_once(|_| {
                Ok(payment(
                    1,
                    100,
                    PaymentMethod::Cod,
                    PaymentStatus::Pending,
                    now(),
                ))
            });
        mocks
            .discounts
            .expect_mark_used()
            .once()
            .with(eq(DiscountId::new(5)), eq(CUSTOMER))
            .return_once(|_, _| Ok(()));
        mocks
            .carts
            .expect_remove_item()
            .once()
            .with(eq(CUSTOMER), eq(BOOK_1))
            .return_once(|_, _| Ok(()));

        let session = open(mocks).await?;
        session.toggle_selected(BOOK_1)?;
        session.apply_voucher("SALE10").await?;

        let placed = session.checkout(PaymentMethod::Cod).await?;

        assert_eq!(placed.order.id, OrderId::new(100));
        assert_eq!(placed.draft.totals.discounted, vnd(18_000));

        let cart = session.cart();
        assert!(cart.line(BOOK_1).is_none());
        assert!(cart.line(BOOK_2).is_some());
        assert!(session.applied_voucher().is_none());

        Ok(())
    }

    #[tokio::test]
    async fn checkout_survives_cart_cleanup_failure() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .orders
            .expect_create()
            .once()
            .return_once(|_| Ok(order(101, OrderStatus::Pending, &[(2, 20_000, 1)])));
        mocks.payments.expect_create().once().return_once(|_| {
            Ok(payment(
                2,
                101,
                PaymentMethod::VnPay,
                PaymentStatus::Success,
                now(),
            ))
        });
        mocks.discounts.expect_mark_used().never();
        mocks
            .carts
            .expect_remove_item()
            .once()
            .return_once(|_, _| Err(UpstreamError::Timeout));

        let session = open(mocks).await?;
        session.toggle_selected(BOOK_2)?;

        let placed = session.checkout(PaymentMethod::VnPay).await?;

        assert_eq!(placed.payment.status, PaymentStatus::Success);
        assert!(session.cart().line(BOOK_2).is_none());

        Ok(())
    }

    #[tokio::test]
    async fn empty_selection_cannot_check_out() -> TestResult {
        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks.orders.expect_create().never();

        let session = open(mocks).await?;
        let result = session.checkout(PaymentMethod::Cod).await;

        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::EmptySelection))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn expired_voucher_blocks_checkout() -> TestResult {
        let clock = Arc::new(FixedClock::new(now()));
        let flash = Discount::new(NewDiscount {
            id: DiscountId::new(6),
            code: DiscountCode::new("FLASH")?,
            value: DiscountValue::amount(vnd(5_000))?,
            min_order_value: vnd(0),
            expires_at: Some(now() + SignedDuration::from_hours(1)),
            active: true,
            applicable_books: Vec::new(),
            used_by: Vec::new(),
        })?;

        let mut mocks = Mocks::default();
        two_book_cart(&mut mocks);
        mocks
            .discounts
            .expect_list_eligible()
            .once()
            .return_once(move |_, _, _| Ok(vec![flash]));
        mocks.orders.expect_create().never();

        let session = CustomerSession::open(mocks.into_context(clock.clone()), CUSTOMER).await?;
        session.select_all();
        session.apply_voucher("FLASH").await?;

        clock.advance(SignedDuration::from_hours(2));
        let result = session.checkout(PaymentMethod::Momo).await;

        assert!(matches!(
            result,
            Err(EngineError::IneligibleDiscount(IneligibleDiscount::Expired(_)))
        ));
        assert_eq!(session.cart().currency(), VND);

        Ok(())
    }
}
