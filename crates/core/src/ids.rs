//! Typed Identifiers
//!
//! The storefront backend hands out opaque integer keys for every entity. Each key is wrapped
//! in a [`TypedId`] tagged with a marker so a book id can never be passed where an order id is
//! expected.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque, stable identifier tagged with the entity it names.
pub struct TypedId<T>(u64, PhantomData<T>);

impl<T> TypedId<T> {
    /// Wrap a raw backend key.
    pub const fn new(raw: u64) -> Self {
        Self(raw, PhantomData)
    }

    /// The raw backend key.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl<T> Clone for TypedId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedId<T> {}

impl<T> Debug for TypedId<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<T> Display for TypedId<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl<T> PartialEq for TypedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for TypedId<T> {}

impl<T> Hash for TypedId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialOrd for TypedId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> From<u64> for TypedId<T> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<T> From<TypedId<T>> for u64 {
    fn from(value: TypedId<T>) -> Self {
        value.get()
    }
}

impl<T> Serialize for TypedId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de, T> Deserialize<'de> for TypedId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::new)
    }
}

/// Marker types for [`TypedId`].
pub mod markers {
    /// Catalog book.
    #[derive(Debug)]
    pub enum Book {}

    /// Seller (store).
    #[derive(Debug)]
    pub enum Seller {}

    /// Customer account.
    #[derive(Debug)]
    pub enum Customer {}

    /// Placed order.
    #[derive(Debug)]
    pub enum Order {}

    /// Payment record.
    #[derive(Debug)]
    pub enum Payment {}

    /// Discount (voucher) code.
    #[derive(Debug)]
    pub enum Discount {}
}

/// Book identifier.
pub type BookId = TypedId<markers::Book>;

/// Seller identifier.
pub type SellerId = TypedId<markers::Seller>;

/// Customer (user) identifier.
pub type CustomerId = TypedId<markers::Customer>;

/// Order identifier.
pub type OrderId = TypedId<markers::Order>;

/// Payment identifier.
pub type PaymentId = TypedId<markers::Payment>;

/// Discount identifier.
pub type DiscountId = TypedId<markers::Discount>;
