use crate::api::KrakenApi;
use crate::client::KrakenRestClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use xb_types::normalize::TickerFieldPolicy;
use xb_types::{
    market_name_for, ExchangeError, ExchangeWrapper, FeeSchedule, Market, MarketSummary,
    OrderBook, PendingLimitOrder, Result, Ticker, TradeType,
};

/// Kraken has no push feed here; the feed operations keep their unsupported defaults.
pub struct KrakenWrapper {
    api: Arc<dyn KrakenApi>,
    fees: FeeSchedule,
    ticker_policy: TickerFieldPolicy,
}

impl KrakenWrapper {
    pub const NAME: &'static str = "kraken";

    pub fn new(public_key: String, secret_key: String) -> KrakenWrapper {
        KrakenWrapper::with_api(Arc::new(KrakenRestClient::new(public_key, secret_key)))
    }

    pub fn with_api(api: Arc<dyn KrakenApi>) -> KrakenWrapper {
        KrakenWrapper {
            api,
            fees: FeeSchedule::new(Decimal::new(16, 4), Decimal::new(26, 4)),
            ticker_policy: TickerFieldPolicy::default(),
        }
    }

    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> KrakenWrapper {
        self.fees = fees;
        self
    }

    pub fn with_ticker_policy(mut self, ticker_policy: TickerFieldPolicy) -> KrakenWrapper {
        self.ticker_policy = ticker_policy;
        self
    }

    async fn place_limit_order(&self, market: &Market, order: PendingLimitOrder) -> Result<String> {
        let pair = market_name_for(market, self)?;
        let txids = self.api.add_order(pair, &order).await?;
        if txids.is_empty() {
            return Err(ExchangeError::data("txid", "[]"));
        }

        let id = txids.join(",");
        info!(
            "Kraken: Placed {:?} order {id} for {} {pair} at {}",
            order.side, order.amount, order.price
        );
        Ok(id)
    }
}

#[async_trait]
impl ExchangeWrapper for KrakenWrapper {
    fn name(&self) -> &str {
        KrakenWrapper::NAME
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        let pairs = self.api.asset_pairs().await?;

        let mut markets: Vec<_> = pairs
            .iter()
            .filter(|(_, pair)| pair.is_tradeable())
            .filter_map(|(name, pair)| pair.market(KrakenWrapper::NAME, name))
            .collect();
        markets.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(markets)
    }

    async fn get_ticker(&self, market: &Market) -> Result<Ticker> {
        let pair = market_name_for(market, self)?;
        let ticker = self.api.ticker(pair).await?.ticker(&self.ticker_policy)?;
        market.record_ticker(&ticker);
        Ok(ticker)
    }

    async fn get_market_summary(&self, market: &Market) -> Result<MarketSummary> {
        let pair = market_name_for(market, self)?;
        let summary = self.api.ticker(pair).await?.summary(&self.ticker_policy)?;
        market.record_summary(summary.clone());
        Ok(summary)
    }

    async fn get_order_book(&self, market: &Market) -> Result<OrderBook> {
        let pair = market_name_for(market, self)?;
        let depth = self.api.depth(pair).await?;

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
