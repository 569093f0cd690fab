use crate::api::BinanceApi;
use crate::client::BinanceRestClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use xb_types::{
    market_name_for, ExchangeWrapper, FeeSchedule, Market, MarketSummary, OrderBook,
    PendingLimitOrder, Result, Ticker, TradeType,
};

/// Binance spot over REST. There is no push feed, the feed operations keep their unsupported
/// defaults.
pub struct BinanceWrapper {
    api: Arc<dyn BinanceApi>,
    fees: FeeSchedule,
}

impl BinanceWrapper {
    pub const NAME: &'static str = "binance";

    pub fn new(public_key: String, secret_key: String) -> BinanceWrapper {
        BinanceWrapper::with_api(Arc::new(BinanceRestClient::new(public_key, secret_key)))
    }

    pub fn with_api(api: Arc<dyn BinanceApi>) -> BinanceWrapper {
        BinanceWrapper {
            api,
            fees: FeeSchedule::new(Decimal::new(1, 3), Decimal::new(1, 3)),
        }
    }

    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> BinanceWrapper {
        self.fees = fees;
        self
    }

    async fn place_limit_order(&self, market: &Market, order: PendingLimitOrder) -> Result<String> {
        let symbol = market_name_for(market, self)?;
        let id = self.api.place_limit_order(symbol, &order).await?;
        info!(
            "Binance: Placed {:?} order {id} for {} {symbol} at {}",
            order.side, order.amount, order.price
        );
        Ok(id)
    }
}

#[async_trait]
impl ExchangeWrapper for BinanceWrapper {
    fn name(&self) -> &str {
        BinanceWrapper::NAME
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        let symbols = self.api.symbols().await?;

        Ok(symbols
            .iter()
            .filter(|symbol| symbol.is_tradeable())
            .map(|symbol| symbol.market(BinanceWrapper::NAME))
            .collect())
    }

    async fn get_ticker(&self, market: &Market) -> Result<Ticker> {
        let symbol = market_name_for(market, self)?;
        let ticker = self.api.book_ticker(symbol).await?.ticker()?;
        market.record_ticker(&ticker);
        Ok(ticker)
    }

    async fn get_market_summary(&self, market: &Market) -> Result<MarketSummary> {
        let symbol = market_name_for(market, self)?;
        let summary = self.api.daily_stats(symbol).await?.summary()?;
        market.record_summary(summary.clone());
        Ok(summary)
    }

    async fn get_order_book(&self, market: &Market) -> Result<OrderBook> {
        let symbol = market_name_for(market, self)?;
        let depth = self.api.depth(symbol).await?;

        let order_book = OrderBook::from_orders(depth.orders()?);
        market.record_order_book(order_book.clone());
        Ok(order_book)
    }

    async fn buy_limit(&self, market: &Market, amount: Decimal, limit: Decimal) -> Result<String> {
        self.place_limit_order(market, PendingLimitOrder::buy(amount, limit)?)
            .await
    }

    async fn sell_limit(&self, market: &Market, amount: Decimal, limit: Decimal) -> Result<String> {
        self.place_limit_order(market, PendingLimitOrder::sell(amount, limit)?)
            .await
    }

    fn calculate_trading_fees(
        &self,
        _market: &Market,
        amount: Decimal,
        limit: Decimal,
        trade_type: TradeType,
    ) -> Decimal {
        self.fees.trading_fee(amount, limit, trade_type)
    }
}
