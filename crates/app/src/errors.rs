//! Engine errors.

use quire::{
    cart::CartError,
    checkout::CheckoutError,
    discounts::{DiscountError, IneligibleDiscount},
    errors::ValidationError,
    ids::BookId,
    orders::{PaymentError, TransitionError},
};
use thiserror::Error;

/// Failures talking to the storefront backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("backend request timed out")]
    Timeout,

    #[error("backend rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("unexpected backend response: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Everything a session or order desk operation can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("book {0} is not in the cart")]
    NotInCart(BookId),

    #[error(transparent)]
    IneligibleDiscount(#[from] IneligibleDiscount),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("update to book {book} conflicted with another change")]
    ConcurrencyConflict {
        book: BookId,
        #[source]
        source: Option<UpstreamError>,
    },

    #[error("backend call failed")]
    UpstreamFailure(#[from] UpstreamError),
}

impl EngineError {
    /// Classify a failed optimistic mutation: a rejection means the backend disagreed with our
    /// view of the line, anything else is a plain upstream failure.
    pub fn from_mutation(book: BookId, error: UpstreamError) -> Self {
        match error {
            UpstreamError::Rejected { .. } => Self::ConcurrencyConflict {
                book,
                source: Some(error),
            },
            other => Self::UpstreamFailure(other),
        }
    }
}

impl From<CartError> for EngineError {
    fn from(error: CartError) -> Self {
        match error {
            CartError::Validation(error) => Self::Validation(error),
            CartError::UnknownLine(book) => Self::NotInCart(book),
            CartError::MutationInFlight(book) => Self::ConcurrencyConflict { book, source: None },
        }
    }
}

impl From<DiscountError> for EngineError {
    fn from(error: DiscountError) -> Self {
        match error {
            DiscountError::Validation(error) => Self::Validation(error),
            DiscountError::Ineligible(error) => Self::IneligibleDiscount(error),
        }
    }
}

impl From<CheckoutError> for EngineError {
    fn from(error: CheckoutError) -> Self {
        match error {
            CheckoutError::Validation(error) => Self::Validation(error),
            CheckoutError::Ineligible(error) => Self::IneligibleDiscount(error),
        }
    }
}
