//! Selection Set
//!
//! The set of cart lines chosen for the next checkout. This is a true multi-select set:
//! toggling one line never disturbs the others.

use rustc_hash::FxHashSet;

use crate::ids::BookId;

/// Book ids selected for checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    books: FxHashSet<BookId>,
}

impl SelectionSet {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `book` is selected.
    pub fn contains(&self, book: BookId) -> bool {
        self.books.contains(&book)
    }

    /// Select `book`. Returns `false` if it was already selected.
    pub fn insert(&mut self, book: BookId) -> bool {
        self.books.insert(book)
    }

    /// Deselect `book`. Returns `false` if it was not selected.
    pub fn remove(&mut self, book: BookId) -> bool {
        self.books.remove(&book)
    }

    /// Flip the membership of `book`, returning whether it is now selected.
    pub fn toggle(&mut self, book: BookId) -> bool {
        if self.books.remove(&book) {
            false
        } else {
            self.books.insert(book);
            true
        }
    }

    /// Keep only the books for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(BookId) -> bool) {
        self.books.retain(|book| keep(*book));
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.books.clear();
    }

    /// Number of selected books.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Iterate selected books in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = BookId> + '_ {
        self.books.iter().copied()
    }
}

impl FromIterator<BookId> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = BookId>>(iter: I) -> Self {
        Self {
            books: iter.into_iter().collect(),
        }
    }
}
