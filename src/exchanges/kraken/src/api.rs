use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use xb_types::normalize::{order_from_strings, parse_decimal, select, TickerFieldPolicy};
use xb_types::{Market, MarketSummary, Order, OrderSide, PendingLimitOrder, Result, Ticker};

/// The subset of the Kraken REST API used by [`crate::KrakenWrapper`].
#[async_trait]
pub trait KrakenApi: Send + Sync {
    /// Tradeable asset pairs keyed by pair name (`XXBTZUSD`).
    async fn asset_pairs(&self) -> Result<HashMap<String, AssetPair>>;

    async fn ticker(&self, pair: &str) -> Result<TickerInfo>;

    async fn depth(&self, pair: &str) -> Result<Depth>;

    /// Places a limit order and returns its transaction ids.
    async fn add_order(&self, pair: &str, order: &PendingLimitOrder) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetPair {
    pub altname: String,
    pub wsname: Option<String>,
    pub base: String,
    pub quote: String,
    pub status: Option<String>,
}

impl AssetPair {
    pub fn is_tradeable(&self) -> bool {
        self.status.as_deref() == Some("online")
    }

    /// The market for this pair, named after its `BASE/QUOTE` websocket name.
    pub fn market(&self, exchange: &str, pair: &str) -> Option<Market> {
        let (base, quote) = self.wsname.as_deref()?.split_once('/')?;
        Some(Market::new(base, quote).with_alias(exchange, pair))
    }
}

/// Kraken ticker. Every field is an array: `a`, `b` and `c` are `[price, (whole lot) volume,
/// ...]`, `v`, `h` and `l` are `[today, last 24 hours]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TickerInfo {
    pub a: Vec<String>,
    pub b: Vec<String>,
    pub c: Vec<String>,
    pub v: Vec<String>,
    pub h: Vec<String>,
    pub l: Vec<String>,
}

impl TickerInfo {
    fn field(&self, name: &str, values: &[String], index: usize) -> Result<Decimal> {
        parse_decimal(name, select(name, values, index)?)
    }

    pub fn ticker(&self, policy: &TickerFieldPolicy) -> Result<Ticker> {
        Ok(Ticker {
            last: self.field("c", &self.c, policy.last)?,
            bid: self.field("b", &self.b, policy.bid)?,
            ask: self.field("a", &self.a, policy.ask)?,
        })
    }

    pub fn summary(&self, policy: &TickerFieldPolicy) -> Result<MarketSummary> {
        Ok(MarketSummary {
            high: self.field("h", &self.h, policy.high)?,
            low: self.field("l", &self.l, policy.low)?,
            volume: self.field("v", &self.v, policy.volume)?,
            bid: self.field("b", &self.b, policy.bid)?,
            ask: self.field("a", &self.a, policy.ask)?,
            last: self.field("c", &self.c, policy.last)?,
        })
    }
}

/// Book levels as `[price, volume, timestamp]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Depth {
    pub asks: Vec<(String, String, Value)>,
    pub bids: Vec<(String, String, Value)>,
}

impl Depth {
    pub fn orders(&self) -> Result<Vec<Order>> {
        let asks = self.asks.iter().map(|level| level_to_order(OrderSide::Ask, level));
        let bids = self.bids.iter().map(|level| level_to_order(OrderSide::Bid, level));
        asks.chain(bids).collect()
    }
}

fn level_to_order(
    side: OrderSide,
    (price, volume, timestamp): &(String, String, Value),
) -> Result<Order> {
    let order = order_from_strings(side, price, volume)?;
    Ok(match timestamp.as_u64().and_then(|seconds| seconds.checked_mul(1000)) {
        Some(timestamp_ms) => order.with_timestamp_ms(timestamp_ms),
        None => order,
    })
}
