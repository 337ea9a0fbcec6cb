//! App Context

use std::{future::Future, sync::Arc, time::Duration};

use rusty_money::iso::Currency;

use crate::{
    clock::{Clock, SystemClock},
    collaborators::{CartStore, CatalogService, DiscountStore, OrderStore, PaymentStore},
    errors::UpstreamError,
    http::HttpBackend,
};

/// Shared collaborators handed to sessions and order desks.
#[derive(Clone)]
pub struct AppContext {
    pub catalog: Arc<dyn CatalogService>,
    pub carts: Arc<dyn CartStore>,
    pub discounts: Arc<dyn DiscountStore>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub clock: Arc<dyn Clock>,
    pub currency: &'static Currency,
    pub request_timeout: Duration,
}

impl AppContext {
    /// Build a context backed by the storefront REST API.
    #[must_use]
    pub fn from_http(backend: HttpBackend) -> Self {
        let currency = backend.currency();
        let request_timeout = backend.request_timeout();
        let backend = Arc::new(backend);

        Self {
            catalog: backend.clone(),
            carts: backend.clone(),
            discounts: backend.clone(),
            orders: backend.clone(),
            payments: backend,
            clock: Arc::new(SystemClock),
            currency,
            request_timeout,
        }
    }

    /// Await a backend call, giving up after the request timeout.
    ///
    /// # Errors
    ///
    /// Returns the call's own error, or [`UpstreamError::Timeout`] when it takes too long.
    pub async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, UpstreamError> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .unwrap_or_else(|_elapsed| Err(UpstreamError::Timeout))
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("clock", &self.clock)
            .field("currency", &self.currency.iso_alpha_code)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
