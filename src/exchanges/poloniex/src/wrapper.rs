use crate::api::{market_from_pair, PoloniexApi, TickerEntry};
use crate::client::PoloniexRestClient;
use crate::feed::PoloniexFeed;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use xb_subscriber::{FeedSubscriptionManager, SummaryCache};
use xb_types::{
    market_name_for, ExchangeError, ExchangeWrapper, FeeSchedule, Market, MarketSummary,
    OrderBook, PendingLimitOrder, Result, SubscriptionId, SummaryCallback, Ticker, TradeType,
};

pub struct PoloniexWrapper {
    api: Arc<dyn PoloniexApi>,
    feed: FeedSubscriptionManager<PoloniexFeed>,
    fees: FeeSchedule,
}

impl PoloniexWrapper {
    pub const NAME: &'static str = "poloniex";

    pub fn new(public_key: String, secret_key: String) -> PoloniexWrapper {
        PoloniexWrapper::with_api(Arc::new(PoloniexRestClient::new(public_key, secret_key)))
    }

    pub fn with_api(api: Arc<dyn PoloniexApi>) -> PoloniexWrapper {
        PoloniexWrapper {
            feed: FeedSubscriptionManager::new(
                PoloniexWrapper::NAME,
                Arc::new(PoloniexFeed::new(api.clone())),
                Arc::new(SummaryCache::new()),
            ),
            api,
            fees: FeeSchedule::new(Decimal::new(1, 3), Decimal::new(2, 3)),
        }
    }

    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> PoloniexWrapper {
        self.fees = fees;
        self
    }

    pub fn summary_cache(&self) -> &Arc<SummaryCache> {
        self.feed.cache()
    }

    async fn ticker_entry(&self, market: &Market) -> Result<TickerEntry> {
        let pair = market_name_for(market, self)?;
        let mut tickers = self.api.tickers().await?;
        tickers
            .remove(pair)
            .ok_or_else(|| ExchangeError::NotFound(pair.to_string()))
    }

    async fn place_limit_order(&self, market: &Market, order: PendingLimitOrder) -> Result<String> {
        let pair = market_name_for(market, self)?;
        let id = self.api.place_limit_order(pair, &order).await?;
        info!(
            "Poloniex: Placed {:?} order {id} for {} {pair} at {}",
            order.side, order.amount, order.price
        );
        Ok(id)
    }
}

#[async_trait]
impl ExchangeWrapper for PoloniexWrapper {
    fn name(&self) -> &str {
        PoloniexWrapper::NAME
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        let tickers = self.api.tickers().await?;

        let mut markets: Vec<_> = tickers
            .iter()
            .filter(|(_, ticker)| ticker.is_tradeable())
            .filter_map(|(pair, _)| market_from_pair(PoloniexWrapper::NAME, pair))
            .collect();
        markets.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(markets)
    }

    async fn get_ticker(&self, market: &Market) -> Result<Ticker> {
        let ticker = self.ticker_entry(market).await?.ticker()?;
        market.record_ticker(&ticker);
        Ok(ticker)
    }

    async fn get_market_summary(&self, market: &Market) -> Result<MarketSummary> {
        let summary = self.ticker_entry(market).await?.summary()?;
        market.record_summary(summary.clone());
        Ok(summary)
    }

    async fn get_order_book(&self, market: &Market) -> Result<OrderBook> {
        let pair = market_name_for(market, self)?;
        let snapshot = self.api.order_book(pair).await?;

        let order_book = OrderBook::from_orders(snapshot.orders()?);
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

    async fn feed_connect(&self) -> Result<()> {
        self.feed.connect().await
    }

    async fn subscribe_market_summary_feed(
        &self,
        market: &Market,
        on_update: SummaryCallback,
    ) -> Result<SubscriptionId> {
        let pair = market_name_for(market, self)?;
        self.feed.subscribe(market, pair, on_update).await
    }

    async fn unsubscribe_market_summary_feed(
        &self,
        market: &Market,
        subscription: SubscriptionId,
    ) -> Result<()> {
        self.feed.unsubscribe(market, subscription).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BookSnapshot;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::str::FromStr;
    use test_case::test_case;

    #[derive(Default)]
    struct FakeApi {
        orders: Mutex<Vec<(String, PendingLimitOrder)>>,
    }

    fn ticker(id: u64, last: &str, frozen: &str) -> TickerEntry {
        serde_json::from_value(json!({
            "id": id,
            "last": last,
            "lowestAsk": "0.03128000",
            "highestBid": "0.03126001",
            "baseVolume": "1402.49375281",
            "quoteVolume": "44847.41810227",
            "isFrozen": frozen,
            "high24hr": "0.03167980",
            "low24hr": "0.03070001"
        }))
        .unwrap()
    }

    #[async_trait]
    impl PoloniexApi for FakeApi {
        async fn tickers(&self) -> Result<HashMap<String, TickerEntry>> {
            Ok(HashMap::from([
                ("BTC_ETH".to_string(), ticker(148, "0.03127000", "0")),
                ("BTC_LTC".to_string(), ticker(50, "0.00821000", "0")),
                ("BTC_DOGE".to_string(), ticker(27, "0.00000030", "1")),
            ]))
        }

        async fn order_book(&self, pair: &str) -> Result<BookSnapshot> {
            if pair != "BTC_ETH" {
                return Err(ExchangeError::NotFound(pair.to_string()));
            }
            Ok(serde_json::from_value(json!({
                "asks": [["0.03130000", 4], ["0.03128000", 1.5]],
                "bids": [["0.03126001", 0.25], ["0.03127000", 2]]
            }))
            .unwrap())
        }

        async fn place_limit_order(&self, pair: &str, order: &PendingLimitOrder) -> Result<String> {
            self.orders.lock().push((pair.to_string(), order.clone()));
            Ok("31226040".to_string())
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn eth_btc() -> Market {
        Market::new("ETH", "BTC").with_alias(PoloniexWrapper::NAME, "BTC_ETH")
    }

    #[tokio::test]
    async fn frozen_pairs_are_not_listed() {
        let wrapper = PoloniexWrapper::with_api(Arc::new(FakeApi::default()));

        let markets = wrapper.get_markets().await.unwrap();
        let names: Vec<_> = markets.iter().map(|m| m.name()).collect();

        assert_eq!(names, ["ETH-BTC", "LTC-BTC"]);
        assert_eq!(markets[0].symbol_on(PoloniexWrapper::NAME), Some("BTC_ETH"));
    }

    #[tokio::test]
    async fn summary_is_read_from_the_pair_ticker() {
        let wrapper = PoloniexWrapper::with_api(Arc::new(FakeApi::default()));
        let market = eth_btc();

        let summary = wrapper.get_market_summary(&market).await.unwrap();

        assert_eq!(summary.last, dec("0.03127"));
        assert_eq!(summary.high, dec("0.0316798"));
        assert_eq!(summary.low, dec("0.03070001"));
        assert_eq!(market.summary(), Some(summary));
    }

    #[tokio::test]
    async fn missing_pair_is_not_found() {
        let wrapper = PoloniexWrapper::with_api(Arc::new(FakeApi::default()));
        let market = Market::new("XMR", "BTC").with_alias(PoloniexWrapper::NAME, "BTC_XMR");

        let result = wrapper.get_ticker(&market).await;

        assert_eq!(result, Err(ExchangeError::NotFound("BTC_XMR".to_string())));
    }

    #[tokio::test]
    async fn order_book_is_sorted_best_first() {
        let wrapper = PoloniexWrapper::with_api(Arc::new(FakeApi::default()));

        let book = wrapper.get_order_book(&eth_btc()).await.unwrap();

        assert_eq!(book.best_ask().map(|o| o.price()), Some(dec("0.03128")));
        assert_eq!(book.best_bid().map(|o| o.price()), Some(dec("0.03127")));
        assert_eq!(book.asks()[1].quantity(), dec("4"));
    }

    #[tokio::test]
    async fn sell_limit_uses_the_pair_name() {
        let api = Arc::new(FakeApi::default());
        let wrapper = PoloniexWrapper::with_api(api.clone());

        let id = wrapper.sell_limit(&eth_btc(), dec("1.5"), dec("0.0313")).await.unwrap();

        assert_eq!(id, "31226040");
        let orders = api.orders.lock();
        assert_eq!(orders[0].0, "BTC_ETH");
        assert!(!orders[0].1.side.is_buy());
    }

    #[tokio::test]
    async fn market_without_alias_is_rejected() {
        let wrapper = PoloniexWrapper::with_api(Arc::new(FakeApi::default()));
        let market = Market::new("ETH", "BTC").with_alias("bitfinex", "tETHBTC");

        let result = wrapper.subscribe_market_summary_feed(&market, Arc::new(|_: MarketSummary| {})).await;

        assert!(matches!(result, Err(ExchangeError::MissingMarketMapping { .. })));
    }

    #[test_case(TradeType::Maker, "0.2")]
    #[test_case(TradeType::Taker, "0.4")]
    fn trading_fees(trade_type: TradeType, expected: &str) {
        let wrapper = PoloniexWrapper::with_api(Arc::new(FakeApi::default()));

        let fee = wrapper.calculate_trading_fees(&eth_btc(), dec("2"), dec("100"), trade_type);

        assert_eq!(fee, dec(expected));
    }
}
