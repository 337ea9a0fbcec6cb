//! Storefront REST API client.
//!
//! Implements every collaborator trait over `reqwest`. Responses are wrapped in the backend's
//! `{ statusCode, message, data }` envelope; a 404 becomes [`UpstreamError::NotFound`] and any
//! other non-2xx status becomes [`UpstreamError::Rejected`] carrying the envelope message.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use jiff::tz::TimeZone;
use quire::{
    cart::CartLine,
    discounts::{Discount, NewDiscount},
    ids::{BookId, CustomerId, DiscountId, OrderId, PaymentId, SellerId},
    money::StoreMoney,
    orders::{Order, OrderStatus, Payment, PaymentStatus},
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    collaborators::{
        Book, CartStore, CatalogService, DiscountStore, NewOrder, NewPayment, OrderStore,
        PaymentStore,
    },
    config::{BackendConfig, ConfigError},
    errors::UpstreamError,
};

pub(crate) mod dto;

use dto::{
    BookDto, CartDto, CartItemBody, CartItemsBody, Codec, DiscountDto, DiscountQueryBody,
    OrderBody, OrderDto, OrderItemBody, PaymentBody, PaymentDto, RemoveCartItemBody,
    ResponseData, SellerDto, StatusBody,
};

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// API root, e.g. `"http://localhost:8080/api"`.
    pub base_url: String,

    /// Bearer token, if the backend wants one.
    pub token: Option<String>,

    pub timeout: Duration,

    pub currency: &'static Currency,

    /// Zone of the backend's offset-less date-times.
    pub time_zone: TimeZone,
}

impl HttpConfig {
    /// Resolve settings from the backend config group.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unknown currency or time zone.
    pub fn from_backend_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone().filter(|token| !token.is_empty()),
            timeout: config.request_timeout(),
            currency: config.currency()?,
            time_zone: config.time_zone()?,
        })
    }
}

/// HTTP client for the storefront backend.
#[derive(Debug)]
pub struct HttpBackend {
    config: HttpConfig,
    codec: Codec,
    http: Client,
    store_names: Mutex<FxHashMap<SellerId, String>>,
}

impl HttpBackend {
    /// Create a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        let codec = Codec {
            currency: config.currency,
            zone: config.time_zone.clone(),
        };

        Ok(Self {
            config,
            codec,
            http,
            store_names: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn currency(&self) -> &'static Currency {
        self.config.currency
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, UpstreamError> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        debug!(path, "backend request");

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(path.to_string()));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResponseData<serde_json::Value>>(&text)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or(text);

            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn data<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<Option<T>, UpstreamError> {
        let envelope: ResponseData<T> = self.send(request, path).await?.json().await?;

        Ok(envelope.data)
    }

    async fn required<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<T, UpstreamError> {
        self.data(request, path)
            .await?
            .ok_or_else(|| UpstreamError::Decode(format!("{path}: response has no data")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        self.required(self.http.get(self.url(path)), path).await
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, UpstreamError> {
        Ok(self
            .data(self.http.get(self.url(path)), path)
            .await?
            .unwrap_or_default())
    }

    async fn store_name(&self, seller: SellerId) -> Result<String, UpstreamError> {
        let cached = self
            .store_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&seller)
            .cloned();

        if let Some(name) = cached {
            return Ok(name);
        }

        let name = match self
            .get_json::<SellerDto>(&format!("/v1/sellers/getbyid/{seller}"))
            .await
        {
            Ok(dto) => dto.store_name.unwrap_or_default(),
            Err(UpstreamError::NotFound(_)) => String::new(),
            Err(error) => return Err(error),
        };

        self.store_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(seller, name.clone());

        Ok(name)
    }

    fn orders(&self, dtos: Vec<OrderDto>) -> Result<Vec<Order>, UpstreamError> {
        dtos.into_iter().map(|dto| self.codec.order(dto)).collect()
    }

    fn discounts(&self, dtos: Vec<DiscountDto>) -> Result<Vec<Discount>, UpstreamError> {
        dtos.into_iter().map(|dto| self.codec.discount(dto)).collect()
    }

    /// Decode an order mutation response, reloading the order when the backend sent no body.
    async fn order_or_reload(
        &self,
        order: OrderId,
        dto: Option<OrderDto>,
    ) -> Result<Order, UpstreamError> {
        match dto {
            Some(dto) => self.codec.order(dto),
            None => OrderStore::get(self, order).await,
        }
    }
}

#[async_trait]
impl CatalogService for HttpBackend {
    async fn get_book(&self, book: BookId) -> Result<Book, UpstreamError> {
        let dto: BookDto = self.get_json(&format!("/v1/books/get/{book}")).await?;
        let store_name = self.store_name(SellerId::new(dto.seller_id)).await?;

        self.codec.book(dto, store_name)
    }
}

#[async_trait]
impl CartStore for HttpBackend {
    async fn get_cart(&self, customer: CustomerId) -> Result<Vec<CartLine>, UpstreamError> {
        let cart = match self
            .get_json::<CartDto>(&format!("/v1/cart/get/{customer}"))
            .await
        {
            Ok(cart) => cart,
            Err(UpstreamError::NotFound(_)) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let mut lines = Vec::with_capacity(cart.cart_items.len());

        for item in cart.cart_items {
            let store_name = self.store_name(SellerId::new(item.book.seller_id)).await?;
            lines.push(self.codec.cart_line(item, store_name)?);
        }

        Ok(lines)
    }

    async fn add_item(
        &self,
        customer: CustomerId,
        book: BookId,
        delta: i32,
    ) -> Result<(), UpstreamError> {
        let path = "/v1/cart/add";
        let body = CartItemsBody {
            user_id: customer,
            cart_items: vec![CartItemBody {
                book_id: book,
                quantity: delta,
            }],
        };

        self.send(self.http.post(self.url(path)).json(&body), path)
            .await?;

        Ok(())
    }

    async fn remove_item(&self, customer: CustomerId, book: BookId) -> Result<(), UpstreamError> {
        let path = "/v1/cart/remove";
        let body = RemoveCartItemBody {
            user_id: customer,
            book_id: book,
        };

        self.send(self.http.post(self.url(path)).json(&body), path)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl DiscountStore for HttpBackend {
    async fn list_all(&self) -> Result<Vec<Discount>, UpstreamError> {
        let dtos = self.list("/discounts/all").await?;

        self.discounts(dtos)
    }

    async fn list_eligible(
        &self,
        customer: CustomerId,
        book: BookId,
        order_value: StoreMoney,
    ) -> Result<Vec<Discount>, UpstreamError> {
        let path = "/discounts/available";
        let body = DiscountQueryBody {
            user_id: customer,
            book_id: book,
            order_value: self.codec.decimal(&order_value),
        };

        // The backend answers "nothing available" with a 404.
        let dtos = match self
            .data::<Vec<DiscountDto>>(self.http.post(self.url(path)).json(&body), path)
            .await
        {
            Ok(dtos) => dtos.unwrap_or_default(),
            Err(UpstreamError::NotFound(_)) => Vec::new(),
            Err(error) => return Err(error),
        };

        self.discounts(dtos)
    }

    async fn mark_used(
        &self,
        discount: DiscountId,
        customer: CustomerId,
    ) -> Result<(), UpstreamError> {
        let path = format!("/discounts/add-user/{discount}");
        let request = self
            .http
            .post(self.url(&path))
            .query(&[("userId", customer.get())]);

        // Plain text body.
        self.send(request, &path).await?;

        Ok(())
    }

    async fn create(&self, discount: NewDiscount) -> Result<Discount, UpstreamError> {
        let path = "/discounts/create";
        let body = self.codec.discount_body(discount);
        let dto: DiscountDto = self
            .required(self.http.post(self.url(path)).json(&body), path)
            .await?;

        self.codec.discount(dto)
    }

    async fn delete(&self, discount: DiscountId) -> Result<(), UpstreamError> {
        let path = format!("/discounts/delete/{discount}");

        self.send(self.http.delete(self.url(&path)), &path).await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for HttpBackend {
    async fn create(&self, order: NewOrder) -> Result<Order, UpstreamError> {
        let path = "/orders/create";
        let body = OrderBody {
            customer_id: order.customer,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemBody {
                    book_id: item.book,
                    quantity: item.quantity.get(),
                    discount_code: item.discount_code.map(|code| code.to_string()),
                })
                .collect(),
        };
        let dto: OrderDto = self
            .required(self.http.post(self.url(path)).json(&body), path)
            .await?;

        self.codec.order(dto)
    }

    async fn get(&self, order: OrderId) -> Result<Order, UpstreamError> {
        let dto: OrderDto = self.get_json(&format!("/orders/getbyid/{order}")).await?;

        self.codec.order(dto)
    }

    async fn list_by_customer(&self, customer: CustomerId) -> Result<Vec<Order>, UpstreamError> {
        let dtos = self.list(&format!("/orders/customer/{customer}")).await?;

        self.orders(dtos)
    }

    async fn list_by_seller(&self, seller: SellerId) -> Result<Vec<Order>, UpstreamError> {
        let dtos = self
            .list(&format!("/orders/seller/pending/{seller}"))
            .await?;

        self.orders(dtos)
    }

    async fn list_all(&self) -> Result<Vec<Order>, UpstreamError> {
        let dtos = self.list("/orders/all").await?;

        self.orders(dtos)
    }

    async fn update_status(
        &self,
        order: OrderId,
        status: OrderStatus,
    ) -> Result<Order, UpstreamError> {
        let path = format!("/orders/status/{order}");
        let request = self
            .http
            .put(self.url(&path))
            .json(&StatusBody { status });
        let dto = self.data(request, &path).await?;

        self.order_or_reload(order, dto).await
    }

    async fn cancel(&self, order: OrderId) -> Result<Order, UpstreamError> {
        let path = format!("/orders/cancel/{order}");
        let dto = self.data(self.http.post(self.url(&path)), &path).await?;

        self.order_or_reload(order, dto).await
    }
}

#[async_trait]
impl PaymentStore for HttpBackend {
    async fn create(&self, payment: NewPayment) -> Result<Payment, UpstreamError> {
        let path = "/payments/create";
        let body = PaymentBody {
            order_id: payment.order,
            amount: self.codec.decimal(&payment.amount),
            method: payment.method,
            discount: self.codec.decimal(&payment.discount),
        };
        let dto: PaymentDto = self
            .required(self.http.post(self.url(path)).json(&body), path)
            .await?;

        self.codec.payment(dto)
    }

    async fn update_status(
        &self,
        payment: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, UpstreamError> {
        let path = format!("/payments/status/{payment}");
        let request = self
            .http
            .put(self.url(&path))
            .json(&StatusBody { status });
        let dto: PaymentDto = self.required(request, &path).await?;

        self.codec.payment(dto)
    }

    async fn list_all(&self) -> Result<Vec<Payment>, UpstreamError> {
        let dtos: Vec<PaymentDto> = self.list("/payments/all").await?;

        dtos.into_iter()
            .map(|dto| self.codec.payment(dto))
            .collect()
    }
}
