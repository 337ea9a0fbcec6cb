//! Wire shapes of the storefront REST API and their conversion to engine types.
//!
//! Amounts arrive as decimals in major units and are floored to minor units. Date-times arrive
//! without an offset and are read in the configured zone.

use jiff::{Timestamp, civil::DateTime, tz::TimeZone};
use quire::{
    cart::CartLine,
    discounts::{Discount, DiscountCode, DiscountValue, NewDiscount},
    ids::{BookId, CustomerId, DiscountId, OrderId, PaymentId, SellerId},
    money::{Quantity, StoreMoney},
    orders::{Order, OrderLine, OrderStatus, Payment, PaymentMethod, PaymentStatus},
};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rusty_money::{Money, iso::Currency};
use serde::{Deserialize, Serialize};

use crate::{collaborators::Book, errors::UpstreamError};

/// The `{ statusCode, message, data }` envelope around every JSON response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponseData<T> {
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BookDto {
    pub id: u64,
    pub title: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: u32,
    pub seller_id: u64,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub category_names: Vec<String>,
    #[serde(default, alias = "isActive")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SellerDto {
    pub store_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CartDto {
    #[serde(default)]
    pub cart_items: Vec<CartItemDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CartItemDto {
    pub book: BookDto,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscountDto {
    pub id: u64,
    pub code: String,
    pub discount_amount: Decimal,
    #[serde(default)]
    pub percentage: bool,
    pub min_order_value: Option<Decimal>,
    pub expiry_date: Option<DateTime>,
    #[serde(default)]
    pub active: bool,
    pub applicable_book_ids: Option<Vec<u64>>,
    pub provided_user_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderDto {
    pub id: u64,
    pub customer_id: u64,
    #[serde(default)]
    pub cart_items: Vec<OrderItemDto>,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub order_date: DateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderItemDto {
    pub book_id: u64,
    pub seller_id: u64,
    pub seller_name: Option<String>,
    pub book_title: Option<String>,
    pub book_price: Decimal,
    pub quantity: u32,
    pub discount_code: Option<String>,
    pub discount_amount: Option<Decimal>,
    pub total_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentDto {
    pub id: u64,
    pub order_id: u64,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_date: DateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CartItemsBody {
    pub user_id: CustomerId,
    pub cart_items: Vec<CartItemBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CartItemBody {
    pub book_id: BookId,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoveCartItemBody {
    pub user_id: CustomerId,
    pub book_id: BookId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscountQueryBody {
    pub user_id: CustomerId,
    pub book_id: BookId,
    pub order_value: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscountBody {
    pub code: String,
    pub discount_amount: Decimal,
    pub percentage: bool,
    pub min_order_value: Decimal,
    pub expiry_date: Option<DateTime>,
    pub active: bool,
    pub applicable_book_ids: Vec<BookId>,
    pub provided_user_ids: Vec<CustomerId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderBody {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItemBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderItemBody {
    pub book_id: BookId,
    pub quantity: u32,
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentBody {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub discount: Decimal,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusBody<S> {
    pub status: S,
}

fn decode_error(what: &str, error: impl std::fmt::Display) -> UpstreamError {
    UpstreamError::Decode(format!("{what}: {error}"))
}

/// Converts between wire and engine representations.
#[derive(Debug, Clone)]
pub(crate) struct Codec {
    pub currency: &'static Currency,
    pub zone: TimeZone,
}

impl Codec {
    /// Floor a major-unit decimal to minor units.
    pub fn money(&self, value: Decimal) -> Result<StoreMoney, UpstreamError> {
        let scale = 10_i64
            .checked_pow(self.currency.exponent)
            .ok_or_else(|| decode_error("amount", "currency exponent too large"))?;

        value
            .checked_mul(Decimal::from(scale))
            .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::ToZero))
            .and_then(|scaled| scaled.to_i64())
            .map(|minor| Money::from_minor(minor, self.currency))
            .ok_or_else(|| decode_error("amount", value))
    }

    /// Minor units back to a major-unit decimal.
    pub fn decimal(&self, money: &StoreMoney) -> Decimal {
        Decimal::new(money.to_minor_units(), self.currency.exponent)
    }

    pub fn timestamp(&self, value: DateTime) -> Result<Timestamp, UpstreamError> {
        value
            .to_zoned(self.zone.clone())
            .map(|zoned| zoned.timestamp())
            .map_err(|error| decode_error("date-time", error))
    }

    pub fn datetime(&self, value: Timestamp) -> DateTime {
        value.to_zoned(self.zone.clone()).datetime()
    }

    pub fn book(&self, dto: BookDto, store_name: String) -> Result<Book, UpstreamError> {
        Ok(Book {
            id: BookId::new(dto.id),
            title: dto.title,
            seller: SellerId::new(dto.seller_id),
            store_name,
            price: self.money(dto.price)?,
            stock: dto.stock,
            active: dto.active,
            categories: dto.category_names,
            image: dto.cover_image,
        })
    }

    pub fn cart_line(&self, item: CartItemDto, store_name: String) -> Result<CartLine, UpstreamError> {
        let quantity = Quantity::new(item.quantity).map_err(|error| decode_error("cart item", error))?;
        let book = self.book(item.book, store_name)?;

        Ok(CartLine::new(book.to_cart_line(), quantity))
    }

    pub fn discount(&self, dto: DiscountDto) -> Result<Discount, UpstreamError> {
        let value = if dto.percentage {
            DiscountValue::percentage(dto.discount_amount)
        } else {
            DiscountValue::amount(self.money(dto.discount_amount)?)
        }
        .map_err(|error| decode_error("discount value", error))?;

        let expires_at = dto.expiry_date.map(|expiry| self.timestamp(expiry)).transpose()?;

        Discount::new(NewDiscount {
            id: DiscountId::new(dto.id),
            code: DiscountCode::new(&dto.code).map_err(|error| decode_error("discount code", error))?,
            value,
            min_order_value: self.money(dto.min_order_value.unwrap_or_default())?,
            expires_at,
            active: dto.active,
            applicable_books: dto
                .applicable_book_ids
                .unwrap_or_default()
                .into_iter()
                .map(BookId::new)
                .collect(),
            used_by: dto
                .provided_user_ids
                .unwrap_or_default()
                .into_iter()
                .map(CustomerId::new)
                .collect(),
        })
        .map_err(|error| decode_error("discount", error))
    }

    pub fn discount_body(&self, discount: NewDiscount) -> DiscountBody {
        let (discount_amount, percentage) = match discount.value {
            DiscountValue::PercentageOff(_) => (
                discount.value.percentage_points().unwrap_or_default(),
                true,
            ),
            DiscountValue::AmountOff(amount) => (self.decimal(&amount), false),
        };

        DiscountBody {
            code: discount.code.to_string(),
            discount_amount,
            percentage,
            min_order_value: self.decimal(&discount.min_order_value),
            expiry_date: discount.expires_at.map(|expiry| self.datetime(expiry)),
            active: discount.active,
            applicable_book_ids: discount.applicable_books,
            provided_user_ids: discount.used_by,
        }
    }

    pub fn order(&self, dto: OrderDto) -> Result<Order, UpstreamError> {
        let lines = dto
            .cart_items
            .into_iter()
            .map(|item| self.order_line(item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Order {
            id: OrderId::new(dto.id),
            customer: CustomerId::new(dto.customer_id),
            status: dto.status,
            lines,
            total_price: self.money(dto.total_price)?,
            ordered_at: self.timestamp(dto.order_date)?,
        })
    }

    fn order_line(&self, item: OrderItemDto) -> Result<OrderLine, UpstreamError> {
        let quantity = Quantity::new(item.quantity).map_err(|error| decode_error("order item", error))?;
        let unit_price = self.money(item.book_price)?;
        let discount_amount = self.money(item.discount_amount.unwrap_or_default())?;

        let total = match item.total_amount {
            Some(total) => self.money(total)?,
            None => quire::money::line_total(&unit_price, quantity)
                .ok()
                .and_then(|subtotal| {
                    subtotal
                        .to_minor_units()
                        .checked_sub(discount_amount.to_minor_units())
                })
                .map(|minor| Money::from_minor(minor, self.currency))
                .ok_or_else(|| decode_error("order item", "total overflows"))?,
        };

        Ok(OrderLine {
            book: BookId::new(item.book_id),
            seller: SellerId::new(item.seller_id),
            store_name: item.seller_name.unwrap_or_default(),
            title: item.book_title.unwrap_or_default(),
            unit_price,
            quantity,
            discount_code: item.discount_code.filter(|code| !code.trim().is_empty()),
            discount_amount,
            total,
        })
    }

    pub fn payment(&self, dto: PaymentDto) -> Result<Payment, UpstreamError> {
        Ok(Payment {
            id: PaymentId::new(dto.id),
            order: OrderId::new(dto.order_id),
            method: dto.method,
            status: dto.status,
            amount: self.money(dto.amount)?,
            paid_at: self.timestamp(dto.payment_date)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{USD, VND};
    use testresult::TestResult;

    use super::*;

    fn codec() -> Codec {
        Codec {
            currency: VND,
            zone: TimeZone::UTC,
        }
    }

    #[test]
    fn amounts_are_floored_to_minor_units() -> TestResult {
        let usd = Codec {
            currency: USD,
            zone: TimeZone::UTC,
        };

        assert_eq!(usd.money(Decimal::new(19_999, 3))?, Money::from_minor(1_999, USD));
        assert_eq!(codec().money(Decimal::new(1_500_050, 2))?, Money::from_minor(15_000, VND));
        assert_eq!(usd.decimal(&Money::from_minor(1_999, USD)), Decimal::new(1_999, 2));

        Ok(())
    }

    #[test]
    fn decodes_order_envelope() -> TestResult {
        let body = r#"{
            "statusCode": "SUC_200",
            "message": "ok",
            "data": {
                "id": 42,
                "customerId": 7,
                "cartItems": [{
                    "id": 1,
                    "bookId": 3,
                    "coverImage": null,
                    "sellerName": "Nha Nam",
                    "bookTitle": "Dune",
                    "bookPrice": 120000.00,
                    "quantity": 2,
                    "sellerId": 9,
                    "discountCode": "SALE10",
                    "discountAmount": 24000,
                    "totalAmount": 216000
                }],
                "totalPrice": 216000.00,
                "status": "SHIPPING",
                "orderDate": "2025-03-01T08:30:00.123",
                "transactionId": null,
                "paid": false
            }
        }"#;

        let envelope: ResponseData<OrderDto> = serde_json::from_str(body)?;
        let order = codec().order(envelope.data.ok_or("missing data")?)?;

        assert_eq!(order.id, OrderId::new(42));
        assert_eq!(order.status, OrderStatus::Shipping);
        assert_eq!(order.total_price, Money::from_minor(216_000, VND));
        assert_eq!(order.ordered_at.to_string(), "2025-03-01T08:30:00.123Z");

        let line = order.lines.first().ok_or("missing line")?;
        assert_eq!(line.store_name, "Nha Nam");
        assert_eq!(line.discount_amount, Money::from_minor(24_000, VND));
        assert_eq!(line.discount_code.as_deref(), Some("SALE10"));

        Ok(())
    }

    #[test]
    fn decodes_percentage_discount() -> TestResult {
        let body = r#"{
            "id": 5,
            "code": "newcustomer20",
            "discountAmount": 20,
            "percentage": true,
            "minOrderValue": 100000,
            "createdAt": "2025-01-01T00:00:00",
            "expiryDate": "2025-12-31T23:59:59",
            "active": true,
            "provider": "ADMIN",
            "providedUserIds": [7]
        }"#;

        let discount = codec().discount(serde_json::from_str(body)?)?;

        assert_eq!(discount.code().as_str(), "NEWCUSTOMER20");
        assert_eq!(discount.value().percentage_points(), Some(Decimal::from(20)));
        assert!(discount.used_by(CustomerId::new(7)));
        assert!(discount.applies_to(BookId::new(1)));
        assert_eq!(
            discount.expires_at().map(|expiry| expiry.to_string()),
            Some("2025-12-31T23:59:59Z".to_string())
        );

        Ok(())
    }

    #[test]
    fn decodes_payment_in_configured_zone() -> TestResult {
        let codec = Codec {
            currency: VND,
            zone: TimeZone::fixed(jiff::tz::offset(7)),
        };
        let body = r#"{
            "id": 8,
            "orderId": 42,
            "amount": 216000,
            "method": "COD",
            "status": "PENDING",
            "paymentDate": "2025-03-01T15:00:00"
        }"#;

        let payment = codec.payment(serde_json::from_str(body)?)?;

        assert_eq!(payment.method, PaymentMethod::Cod);
        assert_eq!(payment.paid_at.to_string(), "2025-03-01T08:00:00Z");

        Ok(())
    }

    #[test]
    fn serialises_requests_in_camel_case() -> TestResult {
        let body = serde_json::to_value(PaymentBody {
            order_id: OrderId::new(42),
            amount: Decimal::from(216_000),
            method: PaymentMethod::VnPay,
            discount: Decimal::ZERO,
        })?;

        assert_eq!(body["orderId"], 42);
        assert_eq!(body["method"], "VNPAY");

        Ok(())
    }
}
