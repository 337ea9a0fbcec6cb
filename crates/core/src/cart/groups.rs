//! Seller grouping

use smallvec::SmallVec;

use crate::{
    cart::{CartLine, subtotal_of},
    errors::ValidationError,
    ids::SellerId,
    money::StoreMoney,
};

/// Lines sold by a single seller.
#[derive(Debug, Clone)]
pub struct SellerGroup<'a> {
    /// Seller all lines belong to.
    pub seller: SellerId,

    /// Store name taken from the seller's first line.
    pub store_name: &'a str,

    /// The seller's lines, in cart order. Never empty.
    pub lines: SmallVec<[&'a CartLine; 4]>,
}

impl SellerGroup<'_> {
    /// Sum of this seller's line subtotals.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the total cannot be represented.
    pub fn subtotal(&self) -> Result<Option<StoreMoney>, ValidationError> {
        let Some(first) = self.lines.first() else {
            return Ok(None);
        };

        subtotal_of(self.lines.iter().copied(), first.unit_price.currency()).map(Some)
    }
}

/// Lazy iterator over seller groups; clone it (or ask the cart again) to restart.
#[derive(Debug, Clone)]
pub struct SellerGroups<'a> {
    lines: &'a [CartLine],
    next: usize,
}

impl<'a> SellerGroups<'a> {
    pub(crate) fn new(lines: &'a [CartLine]) -> Self {
        Self { lines, next: 0 }
    }
}

impl<'a> Iterator for SellerGroups<'a> {
    type Item = SellerGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines;

        while let Some(line) = lines.get(self.next) {
            let index = self.next;
            self.next += 1;

            let seen = lines
                .iter()
                .take(index)
                .any(|earlier| earlier.seller == line.seller);

            if seen {
                continue;
            }

            return Some(SellerGroup {
                seller: line.seller,
                store_name: &line.store_name,
                lines: lines
                    .iter()
                    .skip(index)
                    .filter(|other| other.seller == line.seller)
                    .collect(),
            });
        }

        None
    }
}
