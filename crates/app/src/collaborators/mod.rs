//! Storefront backend collaborators.
//!
//! The engine never persists anything itself. Each trait covers one backend resource and is
//! implemented over HTTP by [`crate::http::HttpBackend`]; tests use the generated mocks.

use async_trait::async_trait;
use mockall::automock;
use quire::{
    cart::CartLine,
    discounts::{Discount, NewDiscount},
    ids::{BookId, CustomerId, DiscountId, OrderId, PaymentId, SellerId},
    money::StoreMoney,
    orders::{Order, OrderStatus, Payment, PaymentStatus},
};

use crate::errors::UpstreamError;

pub mod models;

pub use models::{Book, NewOrder, NewOrderItem, NewPayment};

#[automock]
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Look a book up with its seller's store name.
    async fn get_book(&self, book: BookId) -> Result<Book, UpstreamError>;
}

#[automock]
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The customer's cart as the backend sees it.
    async fn get_cart(&self, customer: CustomerId) -> Result<Vec<CartLine>, UpstreamError>;

    /// Add `delta` copies of a book; negative deltas take copies away.
    async fn add_item(
        &self,
        customer: CustomerId,
        book: BookId,
        delta: i32,
    ) -> Result<(), UpstreamError>;

    /// Drop a book from the cart.
    async fn remove_item(&self, customer: CustomerId, book: BookId) -> Result<(), UpstreamError>;
}

#[automock]
#[async_trait]
pub trait DiscountStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Discount>, UpstreamError>;

    /// Vouchers the backend considers usable for this customer, book and order value.
    async fn list_eligible(
        &self,
        customer: CustomerId,
        book: BookId,
        order_value: StoreMoney,
    ) -> Result<Vec<Discount>, UpstreamError>;

    /// Record that the customer used a voucher.
    async fn mark_used(
        &self,
        discount: DiscountId,
        customer: CustomerId,
    ) -> Result<(), UpstreamError>;

    async fn create(&self, discount: NewDiscount) -> Result<Discount, UpstreamError>;

    async fn delete(&self, discount: DiscountId) -> Result<(), UpstreamError>;
}

#[automock]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<Order, UpstreamError>;

    async fn get(&self, order: OrderId) -> Result<Order, UpstreamError>;

    async fn list_by_customer(&self, customer: CustomerId) -> Result<Vec<Order>, UpstreamError>;

    /// Orders containing at least one of the seller's books.
    async fn list_by_seller(&self, seller: SellerId) -> Result<Vec<Order>, UpstreamError>;

    async fn list_all(&self) -> Result<Vec<Order>, UpstreamError>;

    async fn update_status(
        &self,
        order: OrderId,
        status: OrderStatus,
    ) -> Result<Order, UpstreamError>;

    async fn cancel(&self, order: OrderId) -> Result<Order, UpstreamError>;
}

#[automock]
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment, UpstreamError>;

    async fn update_status(
        &self,
        payment: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, UpstreamError>;

    async fn list_all(&self) -> Result<Vec<Payment>, UpstreamError>;
}
