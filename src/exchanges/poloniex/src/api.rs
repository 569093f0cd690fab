use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use xb_types::normalize::{order_from_strings, parse_decimal, select};
use xb_types::{
    ExchangeError, Market, MarketSummary, Order, OrderSide, PendingLimitOrder, Result, Ticker,
};

/// The subset of the Poloniex API used by [`crate::PoloniexWrapper`].
#[async_trait]
pub trait PoloniexApi: Send + Sync {
    /// Ticker of every pair, keyed by pair name (`BTC_ETH`).
    async fn tickers(&self) -> Result<HashMap<String, TickerEntry>>;

    async fn order_book(&self, pair: &str) -> Result<BookSnapshot>;

    /// Places a limit order and returns its order number.
    async fn place_limit_order(&self, pair: &str, order: &PendingLimitOrder) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerEntry {
    pub id: u64,
    pub last: String,
    pub lowest_ask: String,
    pub highest_bid: String,
    pub base_volume: String,
    pub quote_volume: String,
    pub high24hr: String,
    pub low24hr: String,
    pub is_frozen: String,
}

impl TickerEntry {
    /// Frozen pairs are listed but cannot be traded.
    pub fn is_tradeable(&self) -> bool {
        self.is_frozen == "0"
    }

    pub fn ticker(&self) -> Result<Ticker> {
        Ok(Ticker {
            last: parse_decimal("last", &self.last)?,
            bid: parse_decimal("highestBid", &self.highest_bid)?,
            ask: parse_decimal("lowestAsk", &self.lowest_ask)?,
        })
    }

    pub fn summary(&self) -> Result<MarketSummary> {
        Ok(MarketSummary {
            high: parse_decimal("high24hr", &self.high24hr)?,
            low: parse_decimal("low24hr", &self.low24hr)?,
            volume: parse_decimal("baseVolume", &self.base_volume)?,
            bid: parse_decimal("highestBid", &self.highest_bid)?,
            ask: parse_decimal("lowestAsk", &self.lowest_ask)?,
            last: parse_decimal("last", &self.last)?,
        })
    }
}

/// Book levels as `[rate, amount]`. Poloniex sends the rate as a string and the amount as a
/// number.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BookSnapshot {
    pub asks: Vec<(String, Value)>,
    pub bids: Vec<(String, Value)>,
}

impl BookSnapshot {
    pub fn orders(&self) -> Result<Vec<Order>> {
        let asks = self.asks.iter().map(|level| level_to_order(OrderSide::Ask, level));
        let bids = self.bids.iter().map(|level| level_to_order(OrderSide::Bid, level));
        asks.chain(bids).collect()
    }
}

fn level_to_order(side: OrderSide, (rate, amount): &(String, Value)) -> Result<Order> {
    let amount = match amount {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(ExchangeError::data("amount", other)),
    };
    order_from_strings(side, rate, &amount)
}

/// Poloniex names pairs `QUOTE_BASE`, so `BTC_ETH` is the market `ETH-BTC`.
pub fn market_from_pair(exchange: &str, pair: &str) -> Option<Market> {
    let (quote, base) = pair.split_once('_')?;
    if quote.is_empty() || base.is_empty() {
        return None;
    }
    Some(Market::new(base, quote).with_alias(exchange, pair))
}

// Ticker channel update layout:
// [PAIR_ID, LAST, LOWEST_ASK, HIGHEST_BID, PERCENT_CHANGE, BASE_VOLUME, QUOTE_VOLUME, IS_FROZEN,
//  HIGH_24HR, LOW_24HR]
pub const PAIR_ID: usize = 0;
const LAST: usize = 1;
const LOWEST_ASK: usize = 2;
const HIGHEST_BID: usize = 3;
const BASE_VOLUME: usize = 5;
const HIGH: usize = 8;
const LOW: usize = 9;

pub fn summary_from_update(values: &[Value]) -> Result<MarketSummary> {
    let field = |name: &str, index: usize| -> Result<Decimal> {
        let value = select(name, values, index)?;
        match value {
            Value::String(s) => parse_decimal(name, s),
            other => Err(ExchangeError::data(name, other)),
        }
    };

    Ok(MarketSummary {
        high: field("high24hr", HIGH)?,
        low: field("low24hr", LOW)?,
        volume: field("baseVolume", BASE_VOLUME)?,
        bid: field("highestBid", HIGHEST_BID)?,
        ask: field("lowestAsk", LOWEST_ASK)?,
        last: field("last", LAST)?,
    })
}
