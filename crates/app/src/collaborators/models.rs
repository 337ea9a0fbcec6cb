//! Collaborator models.

use quire::{
    cart::NewCartLine,
    checkout::CheckoutDraft,
    discounts::DiscountCode,
    ids::{BookId, CustomerId, OrderId, SellerId},
    money::{Quantity, StoreMoney},
    orders::PaymentMethod,
};

/// A catalogue listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub seller: SellerId,
    pub store_name: String,
    pub price: StoreMoney,
    pub stock: u32,
    pub active: bool,
    pub categories: Vec<String>,
    pub image: Option<String>,
}

impl Book {
    /// Describe this book as a cart line.
    pub fn to_cart_line(&self) -> NewCartLine {
        NewCartLine {
            book: self.id,
            seller: self.seller,
            store_name: self.store_name.clone(),
            unit_price: self.price,
            display_name: self.title.clone(),
            image: self.image.clone(),
        }
    }
}

/// One item of an order create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub book: BookId,
    pub quantity: Quantity,
    pub discount_code: Option<DiscountCode>,
}

/// An order create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer: CustomerId,
    pub items: Vec<NewOrderItem>,
}

impl From<&CheckoutDraft> for NewOrder {
    fn from(draft: &CheckoutDraft) -> Self {
        Self {
            customer: draft.customer,
            items: draft
                .items
                .iter()
                .map(|item| NewOrderItem {
                    book: item.book,
                    quantity: item.quantity,
                    discount_code: item.discount_code.clone(),
                })
                .collect(),
        }
    }
}

/// A payment create request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order: OrderId,
    pub method: PaymentMethod,
    pub amount: StoreMoney,
    pub discount: StoreMoney,
}
