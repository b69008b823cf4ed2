//! Hyperliquid perpetuals REST gateway
//!
//! Order books come from the `/info` endpoint with an `l2Book` request. The
//! response carries `levels[0]` as bids and `levels[1]` as asks; each level's
//! `sz` is the size resting at that price alone.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::exchange::rate_limiter::RateLimiter;
use crate::exchange::ExchangeGateway;
use crate::orderbook::{OrderBookSnapshot, PriceLevel, Side};

pub const EXCHANGE_ID: &str = "hyperliquid";

#[derive(Debug, Serialize)]
struct L2BookRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    coin: &'a str,
}

/// One side entry of an `l2Book` response
#[derive(Debug, Clone, Deserialize)]
pub struct L2Level {
    pub px: String,
    pub sz: String,
    /// Number of orders at this price
    pub n: u32,
}

/// Response body of `{"type": "l2Book"}`
#[derive(Debug, Clone, Deserialize)]
pub struct L2BookResponse {
    pub coin: String,
    /// Exchange time in milliseconds
    pub time: i64,
    pub levels: Vec<Vec<L2Level>>,
}

/// Hyperliquid REST gateway
#[derive(Debug)]
pub struct HyperliquidGateway {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl HyperliquidGateway {
    pub fn new(
        base_url: impl Into<String>,
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
            limiter: RateLimiter::new(EXCHANGE_ID, requests_per_minute, request_timeout),
        })
    }

    /// POST /info `l2Book`; `Ok(None)` when the coin is not listed.
    pub async fn get_l2_book(&self, coin: &str) -> Result<Option<L2BookResponse>, FetchError> {
        self.limiter.wait().await?;

        let url = format!("{}/info", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&L2BookRequest {
                kind: "l2Book",
                coin,
            })
            .send()
            .await?
            .error_for_status()?;

        let book: Option<L2BookResponse> = response.json().await?;
        Ok(book)
    }
}

#[async_trait]
impl ExchangeGateway for HyperliquidGateway {
    async fn fetch_order_book(
        &self,
        _exchange: &str,
        symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError> {
        let coin = coin_for(symbol);
        debug!(symbol = %symbol, coin = %coin, "Fetching Hyperliquid l2Book");

        match self.get_l2_book(coin).await? {
            Some(book) => book_to_snapshot(&book),
            None => Err(FetchError::UnknownSymbol {
                exchange: EXCHANGE_ID.to_string(),
                symbol: symbol.to_string(),
            }),
        }
    }
}

/// Coin name for a symbol: `BTC/USD:USD` and `BTC` both map to `BTC`.
pub fn coin_for(symbol: &str) -> &str {
    let symbol = symbol.trim();
    symbol.split(['/', ':']).next().unwrap_or(symbol)
}

pub fn book_to_snapshot(book: &L2BookResponse) -> Result<OrderBookSnapshot, FetchError> {
    let [bids, asks] = book.levels.as_slice() else {
        return Err(FetchError::InvalidResponse(format!(
            "l2Book for {} has {} sides, expected 2",
            book.coin,
            book.levels.len()
        )));
    };

    let mut snapshot =
        OrderBookSnapshot::new(parse_levels(bids, Side::Bid)?, parse_levels(asks, Side::Ask)?);
    if book.time > 0 {
        snapshot.timestamp = book.time;
    }
    Ok(snapshot)
}

fn parse_levels(raw: &[L2Level], side: Side) -> Result<Vec<PriceLevel>, FetchError> {
    raw.iter()
        .map(|level| {
            let price = Decimal::from_str(&level.px).map_err(|e| {
                FetchError::InvalidResponse(format!("Invalid {} px {:?}: {}", side, level.px, e))
            })?;
            let amount = Decimal::from_str(&level.sz).map_err(|e| {
                FetchError::InvalidResponse(format!("Invalid {} sz {:?}: {}", side, level.sz, e))
            })?;
            Ok(PriceLevel::new(price, amount))
        })
        .collect()
}
