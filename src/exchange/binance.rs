//! Binance spot REST gateway
//!
//! Fetches `/api/v3/depth` snapshots and converts the string price levels into
//! `Decimal` order book levels.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::exchange::rate_limiter::RateLimiter;
use crate::exchange::ExchangeGateway;
use crate::orderbook::{OrderBookSnapshot, PriceLevel, Side};

pub const EXCHANGE_ID: &str = "binance";

/// Binance error code for an unknown trading pair
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Maximum levels the depth endpoint serves
const MAX_DEPTH_LIMIT: u32 = 5000;

/// Response from /api/v3/depth endpoint
///
/// # Example Response
/// ```json
/// {
///   "lastUpdateId": 1027024,
///   "bids": [["4.00000000", "431.00000000"]],
///   "asks": [["4.00000200", "12.00000000"]]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthResponse {
    pub last_update_id: i64,
    /// Bid levels [price, quantity]
    pub bids: Vec<(String, String)>,
    /// Ask levels [price, quantity]
    pub asks: Vec<(String, String)>,
}

/// Error body Binance returns alongside 4xx statuses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// Binance REST gateway
#[derive(Debug)]
pub struct BinanceGateway {
    client: Client,
    base_url: String,
    depth_limit: u32,
    limiter: RateLimiter,
}

impl BinanceGateway {
    pub fn new(
        base_url: impl Into<String>,
        depth_limit: u32,
        requests_per_minute: u32,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("density-scanner/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            depth_limit: depth_limit.clamp(1, MAX_DEPTH_LIMIT),
            limiter: RateLimiter::new(EXCHANGE_ID, requests_per_minute, request_timeout),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get order book depth
    ///
    /// Calls GET /api/v3/depth
    ///
    /// # Errors
    /// * `UnknownSymbol` - Binance rejected the symbol (code -1121)
    /// * `RateLimited` - HTTP 429/418 or client-side quota exhausted
    /// * `Connection` - Network failures, 5xx server errors
    pub async fn get_depth(&self, symbol: &str) -> Result<DepthResponse, FetchError> {
        self.limiter.wait().await?;

        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url, symbol, self.depth_limit
        );

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await?;
            return Err(classify_bad_request(symbol, &body));
        }

        let response = response.error_for_status()?;
        let depth: DepthResponse = response.json().await?;
        Ok(depth)
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn fetch_order_book(
        &self,
        _exchange: &str,
        symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError> {
        debug!(symbol = %symbol, "Fetching Binance depth snapshot");

        let depth = self.get_depth(symbol).await?;
        let snapshot = depth_to_snapshot(&depth)?;

        debug!(
            symbol = %symbol,
            last_update_id = depth.last_update_id,
            bid_levels = snapshot.bids.len(),
            ask_levels = snapshot.asks.len(),
            "Fetched Binance depth snapshot"
        );

        Ok(snapshot)
    }
}

fn classify_bad_request(symbol: &str, body: &str) -> FetchError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) if err.code == INVALID_SYMBOL_CODE => FetchError::UnknownSymbol {
            exchange: EXCHANGE_ID.to_string(),
            symbol: symbol.to_string(),
        },
        Ok(err) => FetchError::InvalidResponse(format!(
            "Binance rejected request ({}): {}",
            err.code, err.msg
        )),
        Err(_) => FetchError::InvalidResponse(format!("HTTP 400: {}", body)),
    }
}

/// Convert a depth response into a snapshot, preserving exchange order.
pub fn depth_to_snapshot(depth: &DepthResponse) -> Result<OrderBookSnapshot, FetchError> {
    Ok(OrderBookSnapshot::new(
        parse_levels(&depth.bids, Side::Bid)?,
        parse_levels(&depth.asks, Side::Ask)?,
    ))
}

fn parse_levels(raw: &[(String, String)], side: Side) -> Result<Vec<PriceLevel>, FetchError> {
    raw.iter()
        .map(|(price_str, qty_str)| {
            let price = Decimal::from_str(price_str).map_err(|e| {
                FetchError::InvalidResponse(format!("Invalid {} price {:?}: {}", side, price_str, e))
            })?;
            let amount = Decimal::from_str(qty_str).map_err(|e| {
                FetchError::InvalidResponse(format!("Invalid {} qty {:?}: {}", side, qty_str, e))
            })?;
            Ok(PriceLevel::new(price, amount))
        })
        .collect()
}
