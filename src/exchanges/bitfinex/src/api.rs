use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use xb_types::normalize::{decimal_from_f64, select};
use xb_types::{MarketSummary, PendingLimitOrder, Result, Ticker};

/// The subset of the Bitfinex v2 API used by [`crate::BitfinexWrapper`].
#[async_trait]
pub trait BitfinexApi: Send + Sync {
    /// Pairs currently open for exchange trading, e.g. `BTCUSD` or `TESTBTC:TESTUSD`.
    async fn exchange_pairs(&self) -> Result<Vec<String>>;

    /// Raw ticker tuple, see [`summary_from_ticker`] for its layout.
    async fn ticker(&self, symbol: &str) -> Result<Vec<f64>>;

    async fn book(&self, symbol: &str) -> Result<Vec<BookEntry>>;

    /// Submits an exchange limit order and returns its id.
    async fn submit_limit_order(&self, symbol: &str, order: &PendingLimitOrder) -> Result<u64>;
}

/// One price level of a book snapshot. Bitfinex encodes the side in the sign of `amount`: bids
/// are positive, asks negative.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct BookEntry {
    pub price: f64,
    pub count: f64,
    pub amount: f64,
}

// Ticker tuple layout, shared by the REST ticker and the websocket ticker channel:
// [BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE, LAST_PRICE, VOLUME, HIGH, LOW]
const BID: usize = 0;
const ASK: usize = 2;
const LAST_PRICE: usize = 6;
const VOLUME: usize = 7;
const HIGH: usize = 8;
const LOW: usize = 9;

pub fn summary_from_ticker(values: &[f64]) -> Result<MarketSummary> {
    let field = |name: &str, index: usize| -> Result<Decimal> {
        decimal_from_f64(name, *select(name, values, index)?)
    };

    Ok(MarketSummary {
        high: field("high", HIGH)?,
        low: field("low", LOW)?,
        volume: field("volume", VOLUME)?,
        bid: field("bid", BID)?,
        ask: field("ask", ASK)?,
        last: field("last_price", LAST_PRICE)?,
    })
}

pub fn ticker_from_tuple(values: &[f64]) -> Result<Ticker> {
    let field = |name: &str, index: usize| -> Result<Decimal> {
        decimal_from_f64(name, *select(name, values, index)?)
    };

    Ok(Ticker {
        last: field("last_price", LAST_PRICE)?,
        bid: field("bid", BID)?,
        ask: field("ask", ASK)?,
    })
}

/// Bitfinex's wire encoding of an order amount: sells are negative.
pub fn signed_amount(order: &PendingLimitOrder) -> String {
    if order.side.is_buy() {
        order.amount.to_string()
    } else {
        format!("-{}", order.amount)
    }
}
