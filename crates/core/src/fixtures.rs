//! Test fixtures shared by unit tests.

use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::{Money, iso::VND};

use crate::{
    cart::{Cart, CartError, NewCartLine},
    discounts::{Discount, DiscountCode, DiscountValue, NewDiscount},
    errors::ValidationError,
    ids::{BookId, CustomerId, DiscountId, OrderId, PaymentId, SellerId},
    money::{Quantity, StoreMoney},
    orders::{Order, OrderLine, OrderStatus, Payment, PaymentMethod, PaymentStatus},
};

pub(crate) fn vnd(minor: i64) -> StoreMoney {
    Money::from_minor(minor, VND)
}

pub(crate) fn new_line(book: u64, seller: u64, price: i64) -> NewCartLine {
    NewCartLine {
        book: BookId::new(book),
        seller: SellerId::new(seller),
        store_name: format!("Store {seller}"),
        unit_price: vnd(price),
        display_name: format!("Book {book}"),
        image: None,
    }
}

/// `{book1: 2 @ 10_000 (seller 10), book2: 1 @ 20_000 (seller 20)}`
pub(crate) fn sample_cart() -> Result<Cart, CartError> {
    let mut cart = Cart::new(CustomerId::new(1), VND);

    cart.add_or_increment(new_line(1, 10, 10_000), 2)?;
    cart.add_or_increment(new_line(2, 20, 20_000), 1)?;

    Ok(cart)
}

pub(crate) fn percentage_discount(
    code: &str,
    percent: i64,
    min_order: i64,
) -> Result<Discount, ValidationError> {
    Discount::new(NewDiscount {
        id: DiscountId::new(1),
        code: DiscountCode::new(code)?,
        value: DiscountValue::percentage(Decimal::from(percent))?,
        min_order_value: vnd(min_order),
        expires_at: None,
        active: true,
        applicable_books: Vec::new(),
        used_by: Vec::new(),
    })
}

pub(crate) fn amount_discount(
    code: &str,
    amount: i64,
    min_order: i64,
) -> Result<Discount, ValidationError> {
    Discount::new(NewDiscount {
        id: DiscountId::new(2),
        code: DiscountCode::new(code)?,
        value: DiscountValue::amount(vnd(amount))?,
        min_order_value: vnd(min_order),
        expires_at: None,
        active: true,
        applicable_books: Vec::new(),
        used_by: Vec::new(),
    })
}

pub(crate) fn order(id: u64, status: OrderStatus, ordered_at: Timestamp) -> Order {
    Order {
        id: OrderId::new(id),
        customer: CustomerId::new(1),
        status,
        lines: vec![OrderLine {
            book: BookId::new(1),
            seller: SellerId::new(10),
            store_name: "Store 10".to_string(),
            title: "Book 1".to_string(),
            unit_price: vnd(10_000),
            quantity: Quantity::ONE,
            discount_code: None,
            discount_amount: vnd(0),
            total: vnd(10_000),
        }],
        total_price: vnd(10_000),
        ordered_at,
    }
}

pub(crate) fn payment(
    order: u64,
    method: PaymentMethod,
    status: PaymentStatus,
    paid_at: Timestamp,
) -> Payment {
    Payment {
        id: PaymentId::new(order * 100),
        order: OrderId::new(order),
        method,
        status,
        amount: vnd(10_000),
        paid_at,
    }
}
