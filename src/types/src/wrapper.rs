use crate::{ExchangeError, Market, MarketSummary, OrderBook, Result, Ticker, TradeType};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Invoked with every summary pushed for a subscribed market.
pub type SummaryCallback = Arc<dyn Fn(MarketSummary) + Send + Sync>;

/// Identifies one registration made through `subscribe_market_summary_feed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(id: u64) -> SubscriptionId {
        SubscriptionId(id)
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Uniform access to a single exchange.
///
/// Implementations translate between the exchange's own API and the normalized model. Errors are
/// returned to the caller as-is; nothing is retried.
#[async_trait]
pub trait ExchangeWrapper: Send + Sync {
    /// Stable identifier of the exchange, used as the key of each market's alias table.
    fn name(&self) -> &str;

    /// Markets currently tradeable on the exchange.
    async fn get_markets(&self) -> Result<Vec<Market>>;

    async fn get_ticker(&self, market: &Market) -> Result<Ticker>;

    async fn get_market_summary(&self, market: &Market) -> Result<MarketSummary>;

    async fn get_order_book(&self, market: &Market) -> Result<OrderBook>;

    /// Places a limit buy order and returns the exchange's order identifier.
    async fn buy_limit(&self, market: &Market, amount: Decimal, limit: Decimal) -> Result<String>;

    /// Places a limit sell order and returns the exchange's order identifier.
    async fn sell_limit(&self, market: &Market, amount: Decimal, limit: Decimal) -> Result<String>;

    fn calculate_trading_fees(
        &self,
        market: &Market,
        amount: Decimal,
        limit: Decimal,
        trade_type: TradeType,
    ) -> Decimal;

    /// # Panics
    ///
    /// Unless overridden, there is no withdrawal fee information for the exchange. Treating that
    /// as a zero fee would be wrong, so this panics.
    fn calculate_withdraw_fees(&self, market: &Market, amount: Decimal) -> Decimal {
        let _ = amount;
        unimplemented!(
            "{} does not expose withdrawal fees (market {})",
            self.name(),
            market.name()
        )
    }

    async fn feed_connect(&self) -> Result<()> {
        Err(ExchangeError::FeedUnsupported(self.name().to_string()))
    }

    async fn subscribe_market_summary_feed(
        &self,
        market: &Market,
        on_update: SummaryCallback,
    ) -> Result<SubscriptionId> {
        let _ = (market, on_update);
        Err(ExchangeError::FeedUnsupported(self.name().to_string()))
    }

    async fn unsubscribe_market_summary_feed(
        &self,
        market: &Market,
        subscription: SubscriptionId,
    ) -> Result<()> {
        let _ = (market, subscription);
        Err(ExchangeError::FeedUnsupported(self.name().to_string()))
    }
}

/// The symbol `wrapper`'s exchange uses for `market`.
pub fn market_name_for<'m, W: ExchangeWrapper + ?Sized>(
    market: &'m Market,
    wrapper: &W,
) -> Result<&'m str> {
    market
        .symbol_on(wrapper.name())
        .ok_or_else(|| ExchangeError::MissingMarketMapping {
            market: market.name().to_string(),
            exchange: wrapper.name().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeeSchedule;

    struct StubExchange;

    #[async_trait]
    impl ExchangeWrapper for StubExchange {
        fn name(&self) -> &str {
            "stub"
        }

        async fn get_markets(&self) -> Result<Vec<Market>> {
            Ok(Vec::new())
        }

        async fn get_ticker(&self, _: &Market) -> Result<Ticker> {
            Err(ExchangeError::NotFound("stub".to_string()))
        }

        async fn get_market_summary(&self, _: &Market) -> Result<MarketSummary> {
            Err(ExchangeError::NotFound("stub".to_string()))
        }

        async fn get_order_book(&self, _: &Market) -> Result<OrderBook> {
            Ok(OrderBook::default())
        }

        async fn buy_limit(&self, _: &Market, _: Decimal, _: Decimal) -> Result<String> {
            Ok("1".to_string())
        }

        async fn sell_limit(&self, _: &Market, _: Decimal, _: Decimal) -> Result<String> {
            Ok("2".to_string())
        }

        fn calculate_trading_fees(
            &self,
            _: &Market,
            amount: Decimal,
            limit: Decimal,
            trade_type: TradeType,
        ) -> Decimal {
            FeeSchedule::new(Decimal::new(1, 3), Decimal::new(2, 3))
                .trading_fee(amount, limit, trade_type)
        }
    }

    #[test]
    fn resolves_registered_alias() {
        let market = Market::new("BTC", "USD").with_alias("stub", "btc_usd");
        assert_eq!(market_name_for(&market, &StubExchange).unwrap(), "btc_usd");
    }

    #[test]
    fn missing_alias_is_never_defaulted() {
        let market = Market::new("BTC", "USD").with_alias("other", "BTCUSD");
        assert_eq!(
            market_name_for(&market, &StubExchange),
            Err(ExchangeError::MissingMarketMapping {
                market: "BTC-USD".to_string(),
                exchange: "stub".to_string(),
            })
        );
    }

    #[test]
    fn resolves_through_trait_object() {
        let market = Market::new("BTC", "USD").with_alias("stub", "btc_usd");
        let wrapper: Arc<dyn ExchangeWrapper> = Arc::new(StubExchange);
        assert_eq!(market_name_for(&market, wrapper.as_ref()).unwrap(), "btc_usd");
    }

    #[test]
    #[should_panic(expected = "does not expose withdrawal fees")]
    fn withdraw_fees_are_not_silently_zero() {
        let market = Market::new("BTC", "USD");
        StubExchange.calculate_withdraw_fees(&market, Decimal::ONE);
    }

    #[tokio::test]
    async fn feed_is_unsupported_by_default() {
        let market = Market::new("BTC", "USD").with_alias("stub", "btc_usd");
        let result = StubExchange
            .subscribe_market_summary_feed(&market, Arc::new(|_| {}))
            .await;
        assert_eq!(result, Err(ExchangeError::FeedUnsupported("stub".to_string())));
    }
}
