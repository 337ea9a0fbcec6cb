//! Optimistic changes
//!
//! A local mutation is applied straight away and handed back as a [`PendingChange`] holding the
//! line exactly as it was before. Once the backend answers, the change is either committed or
//! rolled back. Rolling back restores that one line, its position and its selection state; other
//! books are left alone so independent in-flight changes never clobber each other.
//! A committed change can then be checked against a fresh copy of the backend cart with
//! [`Cart::reconcile_line`].

use crate::{
    cart::{Cart, CartError, CartLine, LineChange, NewCartLine},
    errors::ValidationError,
    ids::BookId,
    money::{self, Quantity},
};

/// A local change awaiting the backend's verdict.
#[derive(Debug)]
#[must_use = "a pending change must be committed or rolled back"]
pub struct PendingChange {
    book: BookId,
    revision: u64,
    change: LineChange,
    before: Option<(usize, CartLine)>,
    was_selected: bool,
}

impl PendingChange {
    /// Book the change applies to.
    pub fn book(&self) -> BookId {
        self.book
    }

    /// Cart revision right after the change was applied locally.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// What happened to the line locally.
    pub fn change(&self) -> LineChange {
        self.change
    }

    /// The line as it was before the change, if it existed.
    pub fn before(&self) -> Option<&CartLine> {
        self.before.as_ref().map(|(_, line)| line)
    }
}

impl Cart {
    /// Whether an optimistic change to `book` is waiting on the backend.
    pub fn is_in_flight(&self, book: BookId) -> bool {
        self.in_flight.contains(&book)
    }

    /// Optimistically add copies of a book.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::MutationInFlight`] if the book already has a pending change, or any
    /// error [`Cart::add_or_increment`] would return.
    pub fn begin_add(&mut self, line: NewCartLine, delta: i32) -> Result<PendingChange, CartError> {
        let book = line.book;

        self.begin(book, |cart| cart.add_or_increment(line, delta))
    }

    /// Optimistically change the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::MutationInFlight`] if the book already has a pending change, or any
    /// error [`Cart::change_quantity`] would return.
    pub fn begin_quantity_change(
        &mut self,
        book: BookId,
        delta: i32,
    ) -> Result<PendingChange, CartError> {
        self.begin(book, |cart| cart.change_quantity(book, delta))
    }

    /// Optimistically remove a line. A missing line yields an [`LineChange::Unchanged`] change.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::MutationInFlight`] if the book already has a pending change.
    pub fn begin_remove(&mut self, book: BookId) -> Result<PendingChange, CartError> {
        self.begin(book, |cart| {
            Ok(cart
                .remove(book)
                .map_or(LineChange::Unchanged, |line| LineChange::Removed(line.quantity)))
        })
    }

    /// Accept a change the backend confirmed.
    pub fn commit(&mut self, pending: PendingChange) {
        self.in_flight.remove(&pending.book);
    }

    /// Undo a change the backend rejected, restoring the line exactly as it was.
    pub fn rollback(&mut self, pending: PendingChange) {
        let PendingChange {
            book,
            before,
            was_selected,
            ..
        } = pending;

        self.in_flight.remove(&book);

        if let Some(index) = self.lines.iter().position(|line| line.book == book) {
            self.lines.remove(index);
        }

        match before {
            Some((index, line)) => {
                let index = index.min(self.lines.len());

                self.lines.insert(index, line);

                if was_selected {
                    self.selection.insert(book);
                } else {
                    self.selection.remove(book);
                }
            }
            None => {
                self.selection.remove(book);
            }
        }

        self.revision += 1;
    }

    /// Take the backend's word for one book after a confirmed change. `server` is a fresh copy
    /// of the whole backend cart; only `book`'s line is read from it. A book with another change
    /// in flight is left alone and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the server line is priced in another currency or merging
    /// duplicate entries overflows. The cart is untouched on error.
    pub fn reconcile_line(
        &mut self,
        book: BookId,
        server: &[CartLine],
    ) -> Result<bool, CartError> {
        if self.in_flight.contains(&book) {
            return Ok(false);
        }

        let mut confirmed: Option<CartLine> = None;

        for line in server.iter().filter(|line| line.book == book) {
            money::ensure_currency(&line.unit_price, self.currency)?;

            match &mut confirmed {
                Some(existing) => {
                    let total = existing
                        .quantity
                        .get()
                        .checked_add(line.quantity.get())
                        .ok_or(ValidationError::QuantityOverflow)?;

                    existing.quantity = Quantity::new(total)?;
                }
                None => confirmed = Some(line.clone()),
            }
        }

        match (self.position(book), confirmed) {
            (Some(index), Some(line)) => {
                if let Some(local) = self.lines.get_mut(index) {
                    *local = line;
                }
            }
            (None, Some(line)) => self.lines.push(line),
            (Some(_), None) => {
                self.remove(book);
            }
            (None, None) => {}
        }

        self.revision += 1;

        Ok(true)
    }

    fn begin(
        &mut self,
        book: BookId,
        apply: impl FnOnce(&mut Self) -> Result<LineChange, CartError>,
    ) -> Result<PendingChange, CartError> {
        if self.in_flight.contains(&book) {
            return Err(CartError::MutationInFlight(book));
        }

        let before = self
            .lines
            .iter()
            .position(|line| line.book == book)
            .and_then(|index| self.lines.get(index).map(|line| (index, line.clone())));
        let was_selected = self.selection.contains(book);

        let change = apply(self)?;

        self.in_flight.insert(book);

        Ok(PendingChange {
            book,
            revision: self.revision,
            change,
            before,
            was_selected,
        })
    }
}
