//! Splitting a selection-level saving across its lines.

use rusty_money::Money;
use smallvec::SmallVec;

use crate::{
    cart::CartLine,
    errors::ValidationError,
    ids::BookId,
    money::StoreMoney,
};

/// The share of a saving attributed to one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSaving {
    /// Book on the line.
    pub book: BookId,

    /// Saving attributed to the line.
    pub saved: StoreMoney,
}

#[derive(Debug)]
struct Share {
    position: usize,
    book: BookId,
    amount: i128,
    remainder: i128,
}

/// Split `saved` across `lines` in proportion to their subtotals.
///
/// Each share is floored to minor units and the leftover minor units go to the lines with the
/// largest fractional remainders (earlier lines first on ties), so the shares always sum to
/// `saved`. Lines are returned in input order.
///
/// # Errors
///
/// Returns a [`ValidationError`] if a subtotal overflows or a share cannot be represented.
pub fn allocate<'l>(
    lines: impl IntoIterator<Item = &'l CartLine>,
    saved: &StoreMoney,
) -> Result<SmallVec<[LineSaving; 8]>, ValidationError> {
    let currency = saved.currency();
    let total_saved = i128::from(saved.to_minor_units().max(0));

    let subtotals = lines
        .into_iter()
        .map(|line| {
            line.subtotal()
                .map(|subtotal| (line.book, i128::from(subtotal.to_minor_units())))
        })
        .collect::<Result<SmallVec<[(BookId, i128); 8]>, _>>()?;

    let denominator: i128 = subtotals.iter().map(|(_, subtotal)| subtotal).sum();

    let mut shares: SmallVec<[Share; 8]> = subtotals
        .iter()
        .enumerate()
        .map(|(position, &(book, subtotal))| {
            let numerator = total_saved * subtotal;

            if denominator <= 0 {
                Share {
                    position,
                    book,
                    amount: 0,
                    remainder: 0,
                }
            } else {
                Share {
                    position,
                    book,
                    amount: numerator / denominator,
                    remainder: numerator % denominator,
                }
            }
        })
        .collect();

    if denominator > 0 {
        let handed_out: i128 = shares.iter().map(|share| share.amount).sum();
        let leftover = usize::try_from(total_saved - handed_out)
            .map_err(|_overflow| ValidationError::AmountOverflow)?;

        shares.sort_by(|a, b| {
            b.remainder
                .cmp(&a.remainder)
                .then(a.position.cmp(&b.position))
        });

        for share in shares.iter_mut().take(leftover) {
            share.amount += 1;
        }

        shares.sort_by_key(|share| share.position);
    }

    shares
        .into_iter()
        .map(|share| {
            i64::try_from(share.amount)
                .map(|minor| LineSaving {
                    book: share.book,
                    saved: Money::from_minor(minor, currency),
                })
                .map_err(|_overflow| ValidationError::AmountOverflow)
        })
        .collect()
}
