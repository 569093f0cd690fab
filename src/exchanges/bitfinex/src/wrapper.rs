use crate::api::{summary_from_ticker, ticker_from_tuple, BitfinexApi, BookEntry};
use crate::client::BitfinexRestClient;
use crate::feed::BitfinexFeed;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, trace};
use xb_subscriber::{FeedSubscriptionManager, SummaryCache};
use xb_types::normalize::decimal_from_f64;
use xb_types::{
    market_name_for, ExchangeWrapper, FeeSchedule, Market, MarketSummary, Order, OrderBook,
    OrderSide, PendingLimitOrder, Result, SubscriptionId, SummaryCallback, Ticker, TradeType,
};

pub struct BitfinexWrapper {
    api: Arc<dyn BitfinexApi>,
    feed: FeedSubscriptionManager<BitfinexFeed>,
    fees: FeeSchedule,
}

impl BitfinexWrapper {
    pub const NAME: &'static str = "bitfinex";

    pub fn new(public_key: String, secret_key: String) -> BitfinexWrapper {
        BitfinexWrapper::with_api(Arc::new(BitfinexRestClient::new(public_key, secret_key)))
    }

    pub fn with_api(api: Arc<dyn BitfinexApi>) -> BitfinexWrapper {
        BitfinexWrapper {
            api,
            feed: FeedSubscriptionManager::new(
                BitfinexWrapper::NAME,
                Arc::new(BitfinexFeed::default()),
                Arc::new(SummaryCache::new()),
            ),
            fees: FeeSchedule::new(Decimal::new(1, 3), Decimal::new(2, 3)),
        }
    }

    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> BitfinexWrapper {
        self.fees = fees;
        self
    }

    /// Latest pushed summary per market, written by the websocket feed.
    pub fn summary_cache(&self) -> &Arc<SummaryCache> {
        self.feed.cache()
    }

    async fn place_limit_order(&self, market: &Market, order: PendingLimitOrder) -> Result<String> {
        let symbol = market_name_for(market, self)?;
        let id = self.api.submit_limit_order(symbol, &order).await?;
        info!(
            "Bitfinex: Placed {:?} order {id} for {} {symbol} at {}",
            order.side, order.amount, order.price
        );
        Ok(id.to_string())
    }
}

#[async_trait]
impl ExchangeWrapper for BitfinexWrapper {
    fn name(&self) -> &str {
        BitfinexWrapper::NAME
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        let pairs = self.api.exchange_pairs().await?;

        Ok(pairs
            .iter()
            .filter_map(|pair| match split_pair(pair) {
                Some((base, quote)) => {
                    Some(Market::new(base, quote).with_alias(BitfinexWrapper::NAME, format!("t{pair}")))
                }
                None => {
                    trace!("Bitfinex: Skipping unrecognised pair {pair}");
                    None
                }
            })
            .collect())
    }

    async fn get_ticker(&self, market: &Market) -> Result<Ticker> {
        let symbol = market_name_for(market, self)?;
        let ticker = ticker_from_tuple(&self.api.ticker(symbol).await?)?;
        market.record_ticker(&ticker);
        Ok(ticker)
    }

    async fn get_market_summary(&self, market: &Market) -> Result<MarketSummary> {
        let symbol = market_name_for(market, self)?;

        if let Some(summary) = self.feed.pushed_summary(market).await {
            return Ok(summary);
        }

        let summary = summary_from_ticker(&self.api.ticker(symbol).await?)?;
        self.feed.cache().set(market, summary.clone());
        market.record_summary(summary.clone());
        Ok(summary)
    }

    async fn get_order_book(&self, market: &Market) -> Result<OrderBook> {
        let symbol = market_name_for(market, self)?;
        let entries = self.api.book(symbol).await?;

        let orders = entries
            .iter()
            .filter(|entry| entry.amount != 0.0)
            .map(order_from_entry)
            .collect::<Result<Vec<_>>>()?;

        let order_book = OrderBook::from_orders(orders);
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
        let symbol = market_name_for(market, self)?;
        self.feed.subscribe(market, symbol, on_update).await
    }

    async fn unsubscribe_market_summary_feed(
        &self,
        market: &Market,
        subscription: SubscriptionId,
    ) -> Result<()> {
        self.feed.unsubscribe(market, subscription).await
    }
}

/// Splits a Bitfinex pair into base and quote. Six letter pairs are two three letter currencies,
/// longer currency codes are separated by a colon.
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    if let Some((base, quote)) = pair.split_once(':') {
        return (!base.is_empty() && !quote.is_empty()).then_some((base, quote));
    }
    if pair.len() == 6 && pair.is_char_boundary(3) {
        return Some(pair.split_at(3));
    }
    None
}

fn order_from_entry(entry: &BookEntry) -> Result<Order> {
    let side = if entry.amount > 0.0 {
        OrderSide::Bid
    } else {
        OrderSide::Ask
    };
    Order::new(
        side,
        decimal_from_f64("price", entry.price)?,
        decimal_from_f64("amount", entry.amount.abs())?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::str::FromStr;
    use test_case::test_case;
    use xb_types::ExchangeError;

    const TICKER: [f64; 10] = [
        10645.0, 73.93, 10647.0, 75.22, 731.6, 0.0738, 10644.5, 14480.89, 10766.0, 9889.1,
    ];

    #[derive(Default)]
    struct FakeApi {
        book: Vec<BookEntry>,
        orders: Mutex<Vec<(String, PendingLimitOrder)>>,
        ticker_calls: Mutex<usize>,
    }

    #[async_trait]
    impl BitfinexApi for FakeApi {
        async fn exchange_pairs(&self) -> Result<Vec<String>> {
            Ok(vec![
                "BTCUSD".to_string(),
                "ETHBTC".to_string(),
                "TESTBTC:TESTUSD".to_string(),
                "XY".to_string(),
            ])
        }

        async fn ticker(&self, symbol: &str) -> Result<Vec<f64>> {
            *self.ticker_calls.lock() += 1;
            match symbol {
                "tBTCUSD" => Ok(TICKER.to_vec()),
                _ => Err(ExchangeError::NotFound(symbol.to_string())),
            }
        }

        async fn book(&self, _symbol: &str) -> Result<Vec<BookEntry>> {
            Ok(self.book.clone())
        }

        async fn submit_limit_order(&self, symbol: &str, order: &PendingLimitOrder) -> Result<u64> {
            let mut orders = self.orders.lock();
            orders.push((symbol.to_string(), order.clone()));
            Ok(1000 + orders.len() as u64)
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entry(price: f64, amount: f64) -> BookEntry {
        BookEntry {
            price,
            count: 1.0,
            amount,
        }
    }

    fn btc_usd() -> Market {
        Market::new("BTC", "USD").with_alias(BitfinexWrapper::NAME, "tBTCUSD")
    }

    #[tokio::test]
    async fn markets_are_split_into_currencies() {
        let wrapper = BitfinexWrapper::with_api(Arc::new(FakeApi::default()));

        let markets = wrapper.get_markets().await.unwrap();
        let names: Vec<_> = markets.iter().map(|m| m.name()).collect();

        assert_eq!(names, ["BTC-USD", "ETH-BTC", "TESTBTC-TESTUSD"]);
        assert_eq!(markets[0].symbol_on(BitfinexWrapper::NAME), Some("tBTCUSD"));
        assert_eq!(
            markets[2].symbol_on(BitfinexWrapper::NAME),
            Some("tTESTBTC:TESTUSD")
        );
    }

    #[tokio::test]
    async fn book_side_follows_amount_sign() {
        let api = FakeApi {
            book: vec![
                entry(101.0, -2.0),
                entry(99.0, 1.5),
                entry(103.0, -0.5),
                entry(100.0, 3.0),
                entry(102.0, -1.0),
                entry(98.0, 0.0),
            ],
            ..FakeApi::default()
        };
        let wrapper = BitfinexWrapper::with_api(Arc::new(api));
        let market = btc_usd();

        let book = wrapper.get_order_book(&market).await.unwrap();

        let asks: Vec<_> = book.asks().iter().map(|o| (o.price(), o.quantity())).collect();
        let bids: Vec<_> = book.bids().iter().map(|o| (o.price(), o.quantity())).collect();
        assert_eq!(
            asks,
            [(dec("101"), dec("2")), (dec("102"), dec("1")), (dec("103"), dec("0.5"))]
        );
        assert_eq!(bids, [(dec("100"), dec("3")), (dec("99"), dec("1.5"))]);
        assert_eq!(market.order_book(), Some(book));
    }

    #[tokio::test]
    async fn summary_is_polled_while_feed_is_down() {
        let api = Arc::new(FakeApi::default());
        let wrapper = BitfinexWrapper::with_api(api.clone());
        let market = btc_usd();

        let summary = wrapper.get_market_summary(&market).await.unwrap();
        wrapper.get_market_summary(&market).await.unwrap();

        assert_eq!(summary.last, dec("10644.5"));
        assert_eq!(*api.ticker_calls.lock(), 2);
        assert_eq!(market.summary(), Some(summary.clone()));
        assert_eq!(wrapper.summary_cache().get(&market), Some(summary));
    }

    #[tokio::test]
    async fn ticker_is_recorded_on_the_market() {
        let wrapper = BitfinexWrapper::with_api(Arc::new(FakeApi::default()));
        let market = btc_usd();

        let ticker = wrapper.get_ticker(&market).await.unwrap();

        assert_eq!(ticker.bid, dec("10645"));
        assert_eq!(market.summary().map(|s| s.last), Some(dec("10644.5")));
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let wrapper = BitfinexWrapper::with_api(Arc::new(FakeApi::default()));
        let market = Market::new("FOO", "BAR").with_alias(BitfinexWrapper::NAME, "tFOOBAR");

        let result = wrapper.get_market_summary(&market).await;

        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn market_without_alias_fails_before_any_request() {
        let api = Arc::new(FakeApi::default());
        let wrapper = BitfinexWrapper::with_api(api.clone());
        let market = Market::new("BTC", "USD").with_alias("poloniex", "USDT_BTC");

        let result = wrapper.get_ticker(&market).await;

        assert!(matches!(
            result,
            Err(ExchangeError::MissingMarketMapping { exchange, .. }) if exchange == "bitfinex"
        ));
        assert_eq!(*api.ticker_calls.lock(), 0);
    }

    #[tokio::test]
    async fn limit_orders_return_the_exchange_id() {
        let api = Arc::new(FakeApi::default());
        let wrapper = BitfinexWrapper::with_api(api.clone());
        let market = btc_usd();

        let buy = wrapper.buy_limit(&market, dec("0.5"), dec("10000")).await.unwrap();
        let sell = wrapper.sell_limit(&market, dec("0.25"), dec("11000")).await.unwrap();

        assert_eq!(buy, "1001");
        assert_eq!(sell, "1002");
        let orders = api.orders.lock();
        assert_eq!(orders[0].0, "tBTCUSD");
        assert_eq!(orders[1].1.side, OrderSide::Ask);
    }

    #[tokio::test]
    async fn non_positive_order_is_rejected() {
        let api = Arc::new(FakeApi::default());
        let wrapper = BitfinexWrapper::with_api(api.clone());

        let result = wrapper.buy_limit(&btc_usd(), dec("0"), dec("10000")).await;

        assert!(matches!(result, Err(ExchangeError::InvalidOrder(_))));
        assert!(api.orders.lock().is_empty());
    }

    #[test_case(TradeType::Maker, "0.2")]
    #[test_case(TradeType::Taker, "0.4")]
    fn trading_fees(trade_type: TradeType, expected: &str) {
        let wrapper = BitfinexWrapper::with_api(Arc::new(FakeApi::default()));

        let fee = wrapper.calculate_trading_fees(&btc_usd(), dec("2"), dec("100"), trade_type);

        assert_eq!(fee, dec(expected));
    }
}
