use async_trait::async_trait;
use serde::Deserialize;
use xb_types::normalize::{order_from_strings, parse_decimal};
use xb_types::{Market, MarketSummary, Order, OrderSide, PendingLimitOrder, Result, Ticker};

/// The subset of the Binance spot REST API used by [`crate::BinanceWrapper`].
#[async_trait]
pub trait BinanceApi: Send + Sync {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>>;

    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker>;

    async fn daily_stats(&self, symbol: &str) -> Result<DailyStats>;

    async fn depth(&self, symbol: &str) -> Result<Depth>;

    /// Places a limit order and returns its client order id.
    async fn place_limit_order(&self, symbol: &str, order: &PendingLimitOrder) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
}

impl SymbolInfo {
    pub fn is_tradeable(&self) -> bool {
        self.status == "TRADING"
    }

    pub fn market(&self, exchange: &str) -> Market {
        Market::new(self.base_asset.as_str(), self.quote_asset.as_str())
            .with_alias(exchange, self.symbol.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicker {
    pub bid_price: String,
    pub ask_price: String,
}

impl BookTicker {
    /// The book ticker carries no trade price, so the best ask stands in for `last`.
    pub fn ticker(&self) -> Result<Ticker> {
        let ask = parse_decimal("askPrice", &self.ask_price)?;
        Ok(Ticker {
            last: ask,
            bid: parse_decimal("bidPrice", &self.bid_price)?,
            ask,
        })
    }
}

/// Rolling 24 hour statistics of one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub last_price: String,
    pub bid_price: String,
    pub ask_price: String,
    pub high_price: String,
    pub low_price: String,
    pub volume: String,
}

impl DailyStats {
    pub fn summary(&self) -> Result<MarketSummary> {
        Ok(MarketSummary {
            high: parse_decimal("highPrice", &self.high_price)?,
            low: parse_decimal("lowPrice", &self.low_price)?,
            volume: parse_decimal("volume", &self.volume)?,
            bid: parse_decimal("bidPrice", &self.bid_price)?,
            ask: parse_decimal("askPrice", &self.ask_price)?,
            last: parse_decimal("lastPrice", &self.last_price)?,
        })
    }
}

/// Book levels as `[price, quantity]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Depth {
    pub asks: Vec<(String, String)>,
    pub bids: Vec<(String, String)>,
}

impl Depth {
    pub fn orders(&self) -> Result<Vec<Order>> {
        let asks = self
            .asks
            .iter()
            .map(|(price, quantity)| order_from_strings(OrderSide::Ask, price, quantity));
        let bids = self
            .bids
            .iter()
            .map(|(price, quantity)| order_from_strings(OrderSide::Bid, price, quantity));
        asks.chain(bids).collect()
    }
}
