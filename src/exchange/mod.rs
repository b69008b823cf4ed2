//! Exchange gateways
//!
//! `ExchangeGateway` is the seam between the scheduler and exchange transport.
//! `GatewayRegistry` routes each request to the gateway registered for its
//! exchange id and is itself a gateway.

pub mod rate_limiter;

#[cfg(feature = "binance")]
pub mod binance;

#[cfg(feature = "hyperliquid")]
pub mod hyperliquid;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RuntimeOptions;
use crate::error::FetchError;
use crate::orderbook::OrderBookSnapshot;

/// Fetch the current order book for one exchange/symbol pair
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn fetch_order_book(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError>;
}

#[async_trait]
impl<T: ExchangeGateway + ?Sized> ExchangeGateway for Arc<T> {
    async fn fetch_order_book(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError> {
        (**self).fetch_order_book(exchange, symbol).await
    }
}

/// Exchange id → gateway routing table
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn ExchangeGateway>>,
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("exchanges", &self.exchanges())
            .finish()
    }
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every gateway compiled into this build.
    pub fn from_options(options: &RuntimeOptions) -> Result<Self, FetchError> {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "binance")]
        registry.register(
            binance::EXCHANGE_ID,
            binance::BinanceGateway::new(
                options.binance_base_url.clone(),
                options.orderbook_depth,
                options.requests_per_minute,
                options.fetch_timeout,
            )?,
        );

        #[cfg(feature = "hyperliquid")]
        registry.register(
            hyperliquid::EXCHANGE_ID,
            hyperliquid::HyperliquidGateway::new(
                options.hyperliquid_base_url.clone(),
                options.requests_per_minute,
                options.fetch_timeout,
            )?,
        );

        #[cfg(not(any(feature = "binance", feature = "hyperliquid")))]
        let _ = options;

        Ok(registry)
    }

    /// Register (or replace) the gateway for `exchange`.
    pub fn register<G>(&mut self, exchange: &str, gateway: G) -> &mut Self
    where
        G: ExchangeGateway + 'static,
    {
        self.gateways
            .insert(exchange.to_lowercase(), Arc::new(gateway));
        self
    }

    pub fn supports(&self, exchange: &str) -> bool {
        self.gateways.contains_key(&exchange.to_lowercase())
    }

    /// Sorted exchange ids
    pub fn exchanges(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.gateways.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ExchangeGateway for GatewayRegistry {
    async fn fetch_order_book(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError> {
        let gateway = self
            .gateways
            .get(&exchange.to_lowercase())
            .ok_or_else(|| FetchError::UnsupportedExchange(exchange.to_string()))?;

        gateway.fetch_order_book(exchange, symbol).await
    }
}
