//! Cart
//!
//! A customer's multi-seller cart: one line per book, grouped by seller for display, with the
//! checkout selection carried alongside so the two can never drift apart.

use rusty_money::iso::Currency;
use thiserror::Error;

use crate::{
    errors::ValidationError,
    ids::{BookId, CustomerId, SellerId},
    money::{self, Quantity, QuantityChange, StoreMoney},
    selection::SelectionSet,
};

pub mod groups;
pub mod pending;

pub use groups::{SellerGroup, SellerGroups};
pub use pending::PendingChange;

/// Errors raised by cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The book has no line in this cart.
    #[error("book {0} is not in the cart")]
    UnknownLine(BookId),

    /// Another optimistic change to the same book has not settled yet.
    #[error("a change to book {0} is already in flight")]
    MutationInFlight(BookId),
}

/// Everything needed to create a line except its quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartLine {
    /// Book being bought.
    pub book: BookId,

    /// Seller listing the book.
    pub seller: SellerId,

    /// Seller's store name, shown as the group heading.
    pub store_name: String,

    /// Price per copy.
    pub unit_price: StoreMoney,

    /// Book title.
    pub display_name: String,

    /// Cover image reference, if any.
    pub image: Option<String>,
}

/// One book in the cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    /// Book being bought.
    pub book: BookId,

    /// Seller listing the book.
    pub seller: SellerId,

    /// Seller's store name.
    pub store_name: String,

    /// Price per copy.
    pub unit_price: StoreMoney,

    /// Number of copies; never zero.
    pub quantity: Quantity,

    /// Book title.
    pub display_name: String,

    /// Cover image reference, if any.
    pub image: Option<String>,
}

impl CartLine {
    /// Create a line from its description and a quantity.
    pub fn new(line: NewCartLine, quantity: Quantity) -> Self {
        Self {
            book: line.book,
            seller: line.seller,
            store_name: line.store_name,
            unit_price: line.unit_price,
            quantity,
            display_name: line.display_name,
            image: line.image,
        }
    }

    /// `unit_price * quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the subtotal cannot be represented.
    pub fn subtotal(&self) -> Result<StoreMoney, ValidationError> {
        money::line_total(&self.unit_price, self.quantity)
    }
}

/// What a mutation did to a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    /// A new line was created.
    Added(Quantity),

    /// An existing line changed quantity.
    Updated {
        /// Quantity before the change.
        from: Quantity,

        /// Quantity after the change.
        to: Quantity,
    },

    /// The line was removed; holds the quantity it had.
    Removed(Quantity),

    /// Nothing changed.
    Unchanged,
}

/// A customer's cart.
#[derive(Debug, Clone)]
pub struct Cart {
    customer: CustomerId,
    currency: &'static Currency,
    lines: Vec<CartLine>,
    selection: SelectionSet,
    revision: u64,
    in_flight: rustc_hash::FxHashSet<BookId>,
}

impl Cart {
    /// Create an empty cart.
    pub fn new(customer: CustomerId, currency: &'static Currency) -> Self {
        Self {
            customer,
            currency,
            lines: Vec::new(),
            selection: SelectionSet::new(),
            revision: 0,
            in_flight: rustc_hash::FxHashSet::default(),
        }
    }

    /// Create a cart holding `lines`. Duplicate books are merged by adding their quantities.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if a line is priced in another currency or a merged quantity
    /// overflows.
    pub fn with_lines(
        customer: CustomerId,
        currency: &'static Currency,
        lines: impl IntoIterator<Item = CartLine>,
    ) -> Result<Self, CartError> {
        let mut cart = Self::new(customer, currency);

        cart.replace_lines(lines)?;
        cart.revision = 0;

        Ok(cart)
    }

    /// Owner of the cart.
    pub fn customer(&self) -> CustomerId {
        self.customer
    }

    /// Currency every line is priced in.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Local revision, bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Lines in the order they were first added.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// The line for `book`, if present.
    pub fn line(&self, book: BookId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.book == book)
    }

    /// Number of distinct books.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of copies across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Sum of every line subtotal, before any discount.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the total cannot be represented.
    pub fn subtotal(&self) -> Result<StoreMoney, ValidationError> {
        subtotal_of(self.lines.iter(), self.currency)
    }

    /// Group lines by seller, in the order each seller first appears.
    pub fn group_by_seller(&self) -> SellerGroups<'_> {
        SellerGroups::new(&self.lines)
    }

    /// Add `delta` copies of a book, creating the line if needed.
    ///
    /// A new line starts at `max(delta, 1)`. For an existing line a result below one removes the
    /// line instead of leaving a zero-quantity entry behind.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the price is in another currency or the quantity overflows.
    /// The cart is untouched on error.
    pub fn add_or_increment(
        &mut self,
        line: NewCartLine,
        delta: i32,
    ) -> Result<LineChange, CartError> {
        money::ensure_currency(&line.unit_price, self.currency)?;

        if self.position(line.book).is_some() {
            return self.change_quantity(line.book, delta);
        }

        let quantity = Quantity::from_delta(delta);

        self.lines.push(CartLine::new(line, quantity));
        self.revision += 1;

        Ok(LineChange::Added(quantity))
    }

    /// Apply a signed delta to an existing line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownLine`] if the book is not in the cart, or a validation error
    /// if the quantity overflows.
    pub fn change_quantity(&mut self, book: BookId, delta: i32) -> Result<LineChange, CartError> {
        let index = self.position(book).ok_or(CartError::UnknownLine(book))?;
        let Some(line) = self.lines.get_mut(index) else {
            return Err(CartError::UnknownLine(book));
        };

        if delta == 0 {
            return Ok(LineChange::Unchanged);
        }

        let from = line.quantity;

        match from.apply_delta(delta)? {
            QuantityChange::Set(to) => {
                line.quantity = to;
                self.revision += 1;

                Ok(LineChange::Updated { from, to })
            }
            QuantityChange::Remove => {
                self.remove(book);

                Ok(LineChange::Removed(from))
            }
        }
    }

    /// Remove the line for `book`, deselecting it. Removing a missing book is a no-op.
    pub fn remove(&mut self, book: BookId) -> Option<CartLine> {
        let index = self.position(book)?;
        let removed = self.lines.remove(index);

        self.selection.remove(book);
        self.revision += 1;

        Some(removed)
    }

    /// Replace every line with a fresh server view. Selections of books that disappeared are
    /// dropped; the rest survive.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if a line is priced in another currency or merging duplicate
    /// books overflows. The cart is untouched on error.
    pub fn replace_lines(
        &mut self,
        lines: impl IntoIterator<Item = CartLine>,
    ) -> Result<(), CartError> {
        let mut merged: Vec<CartLine> = Vec::new();

        for line in lines {
            money::ensure_currency(&line.unit_price, self.currency)?;

            match merged.iter_mut().find(|existing| existing.book == line.book) {
                Some(existing) => {
                    let total = existing
                        .quantity
                        .get()
                        .checked_add(line.quantity.get())
                        .ok_or(ValidationError::QuantityOverflow)?;

                    existing.quantity = Quantity::new(total)?;
                }
                None => merged.push(line),
            }
        }

        self.lines = merged;

        let lines = &self.lines;
        self.selection
            .retain(|book| lines.iter().any(|line| line.book == book));
        self.revision += 1;

        Ok(())
    }

    /// Current checkout selection.
    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Flip whether `book` is selected, returning whether it now is.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownLine`] if the book is not in the cart.
    pub fn toggle_selected(&mut self, book: BookId) -> Result<bool, CartError> {
        self.ensure_line(book)?;

        Ok(self.selection.toggle(book))
    }

    /// Select `book`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownLine`] if the book is not in the cart.
    pub fn select(&mut self, book: BookId) -> Result<(), CartError> {
        self.ensure_line(book)?;
        self.selection.insert(book);

        Ok(())
    }

    /// Deselect `book`, returning whether it had been selected.
    pub fn deselect(&mut self, book: BookId) -> bool {
        self.selection.remove(book)
    }

    /// Select every line.
    pub fn select_all(&mut self) {
        for line in &self.lines {
            self.selection.insert(line.book);
        }
    }

    /// Deselect every line.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Selected lines, in cart order.
    pub fn selected_lines(&self) -> impl Iterator<Item = &CartLine> + Clone + '_ {
        self.lines
            .iter()
            .filter(|line| self.selection.contains(line.book))
    }

    /// Sum of selected line subtotals.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the total cannot be represented.
    pub fn selected_subtotal(&self) -> Result<StoreMoney, ValidationError> {
        subtotal_of(self.selected_lines(), self.currency)
    }

    fn position(&self, book: BookId) -> Option<usize> {
        self.lines.iter().position(|line| line.book == book)
    }

    fn ensure_line(&self, book: BookId) -> Result<(), CartError> {
        match self.position(book) {
            Some(_) => Ok(()),
            None => Err(CartError::UnknownLine(book)),
        }
    }
}

/// Sum of line subtotals.
///
/// # Errors
///
/// Returns a [`ValidationError`] on overflow or currency mismatch.
pub fn subtotal_of<'l>(
    lines: impl IntoIterator<Item = &'l CartLine>,
    currency: &'static Currency,
) -> Result<StoreMoney, ValidationError> {
    let totals = lines
        .into_iter()
        .map(CartLine::subtotal)
        .collect::<Result<Vec<_>, _>>()?;

    money::sum(totals, currency)
}
