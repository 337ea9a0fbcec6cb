//! Shared fixtures for session and order desk tests.

use std::{sync::Arc, time::Duration};

use jiff::Timestamp;
use quire::{
    cart::{CartLine, NewCartLine},
    discounts::{Discount, DiscountCode, DiscountValue, NewDiscount},
    ids::{BookId, CustomerId, DiscountId, OrderId, PaymentId, SellerId},
    money::{Quantity, StoreMoney},
    orders::{Order, OrderLine, OrderStatus, Payment, PaymentMethod, PaymentStatus},
};
use rust_decimal::Decimal;
use rusty_money::{Money, iso::VND};

use crate::{
    clock::FixedClock,
    collaborators::{
        Book, MockCartStore, MockCatalogService, MockDiscountStore, MockOrderStore,
        MockPaymentStore,
    },
    context::AppContext,
};

pub(crate) const CUSTOMER: CustomerId = CustomerId::new(7);

pub(crate) const SELLER: SellerId = SellerId::new(9);

pub(crate) fn vnd(minor: i64) -> StoreMoney {
    Money::from_minor(minor, VND)
}

pub(crate) fn now() -> Timestamp {
    "2025-03-01T12:00:00Z".parse().expect("valid timestamp")
}

pub(crate) fn book(id: u64, price: i64) -> Book {
    Book {
        id: BookId::new(id),
        title: format!("Book {id}"),
        seller: SELLER,
        store_name: "Nha Nam".to_string(),
        price: vnd(price),
        stock: 10,
        active: true,
        categories: vec!["Fiction".to_string()],
        image: None,
    }
}

pub(crate) fn cart_line(id: u64, price: i64, quantity: u32) -> CartLine {
    let line: NewCartLine = book(id, price).to_cart_line();

    CartLine::new(line, Quantity::new(quantity).expect("non-zero quantity"))
}

pub(crate) fn percentage_voucher(code: &str, points: i64, min_order: i64) -> Discount {
    Discount::new(NewDiscount {
        id: DiscountId::new(5),
        code: DiscountCode::new(code).expect("valid code"),
        value: DiscountValue::percentage(Decimal::from(points)).expect("valid percentage"),
        min_order_value: vnd(min_order),
        expires_at: None,
        active: true,
        applicable_books: Vec::new(),
        used_by: Vec::new(),
    })
    .expect("valid voucher")
}

/// An order with one line per `(book, price, quantity)`.
pub(crate) fn order(id: u64, status: OrderStatus, lines: &[(u64, i64, u32)]) -> Order {
    let lines: Vec<OrderLine> = lines
        .iter()
        .map(|&(book, price, quantity)| OrderLine {
            book: BookId::new(book),
            seller: SELLER,
            store_name: "Nha Nam".to_string(),
            title: format!("Book {book}"),
            unit_price: vnd(price),
            quantity: Quantity::new(quantity).expect("non-zero quantity"),
            discount_code: None,
            discount_amount: vnd(0),
            total: vnd(price * i64::from(quantity)),
        })
        .collect();
    let total = lines.iter().map(|line| line.total.to_minor_units()).sum();

    Order {
        id: OrderId::new(id),
        customer: CUSTOMER,
        status,
        lines,
        total_price: vnd(total),
        ordered_at: now(),
    }
}

pub(crate) fn payment(
    id: u64,
    order: u64,
    method: PaymentMethod,
    status: PaymentStatus,
    paid_at: Timestamp,
) -> Payment {
    Payment {
        id: PaymentId::new(id),
        order: OrderId::new(order),
        method,
        status,
        amount: vnd(20_000),
        paid_at,
    }
}

/// Mock collaborators; unset expectations fail the test if called.
#[derive(Default)]
pub(crate) struct Mocks {
    pub catalog: MockCatalogService,
    pub carts: MockCartStore,
    pub discounts: MockDiscountStore,
    pub orders: MockOrderStore,
    pub payments: MockPaymentStore,
}

impl Mocks {
    pub(crate) fn into_context(self, clock: Arc<FixedClock>) -> AppContext {
        AppContext {
            catalog: Arc::new(self.catalog),
            carts: Arc::new(self.carts),
            discounts: Arc::new(self.discounts),
            orders: Arc::new(self.orders),
            payments: Arc::new(self.payments),
            clock,
            currency: VND,
            request_timeout: Duration::from_millis(200),
        }
    }
}
