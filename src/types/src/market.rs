use crate::config::MarketConfig;
use crate::{MarketSummary, OrderBook, Ticker};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// A tradeable currency pair, identified by its canonical name.
///
/// The canonical name, currencies and exchange aliases are fixed at creation. The cached order
/// book and summary are refreshed by the wrapper calls that fetch them.
#[derive(Debug)]
pub struct Market {
    name: String,
    base_currency: String,
    quote_currency: String,
    exchange_names: HashMap<String, String>,
    order_book: RwLock<Option<OrderBook>>,
    summary: RwLock<Option<MarketSummary>>,
}

impl Market {
    pub fn new(base_currency: impl Into<String>, quote_currency: impl Into<String>) -> Market {
        let base_currency = base_currency.into().to_uppercase();
        let quote_currency = quote_currency.into().to_uppercase();

        Market {
            name: format!("{base_currency}-{quote_currency}"),
            base_currency,
            quote_currency,
            exchange_names: HashMap::new(),
            order_book: RwLock::new(None),
            summary: RwLock::new(None),
        }
    }

    pub fn from_config(config: &MarketConfig) -> Market {
        let mut market = Market::new(&config.base_currency, &config.quote_currency);
        market.name = config.name.clone();
        for exchange in &config.exchanges {
            market
                .exchange_names
                .insert(exchange.name.clone(), exchange.market_name.clone());
        }
        market
    }

    pub fn with_alias(mut self, exchange: impl Into<String>, symbol: impl Into<String>) -> Market {
        self.exchange_names.insert(exchange.into(), symbol.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }

    pub fn exchange_names(&self) -> &HashMap<String, String> {
        &self.exchange_names
    }

    pub fn symbol_on(&self, exchange: &str) -> Option<&str> {
        self.exchange_names.get(exchange).map(|s| s.as_str())
    }

    pub fn order_book(&self) -> Option<OrderBook> {
        self.order_book.read().clone()
    }

    pub fn summary(&self) -> Option<MarketSummary> {
        self.summary.read().clone()
    }

    pub fn record_order_book(&self, order_book: OrderBook) {
        *self.order_book.write() = Some(order_book);
    }

    pub fn record_summary(&self, summary: MarketSummary) {
        *self.summary.write() = Some(summary);
    }

    pub fn record_ticker(&self, ticker: &Ticker) {
        self.summary
            .write()
            .get_or_insert_with(MarketSummary::default)
            .update_from_ticker(ticker);
    }
}

impl PartialEq for Market {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Market {}

impl Hash for Market {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketExchangeConfig;
    use rust_decimal::Decimal;

    #[test]
    fn canonical_name_is_upper_case_pair() {
        let market = Market::new("btc", "usd").with_alias("bitfinex", "tBTCUSD");
        assert_eq!(market.name(), "BTC-USD");
        assert_eq!(market.symbol_on("bitfinex"), Some("tBTCUSD"));
        assert_eq!(market.symbol_on("kraken"), None);
    }

    #[test]
    fn from_config_keeps_configured_name_and_aliases() {
        let config = MarketConfig {
            name: "ETH-BTC".to_string(),
            base_currency: "ETH".to_string(),
            quote_currency: "BTC".to_string(),
            exchanges: vec![
                MarketExchangeConfig {
                    name: "poloniex".to_string(),
                    market_name: "BTC_ETH".to_string(),
                },
                MarketExchangeConfig {
                    name: "kraken".to_string(),
                    market_name: "ETHXBT".to_string(),
                },
            ],
        };

        let market = Market::from_config(&config);

        assert_eq!(market.name(), "ETH-BTC");
        assert_eq!(market.exchange_names().len(), 2);
        assert_eq!(market.symbol_on("poloniex"), Some("BTC_ETH"));
    }

    #[test]
    fn ticker_refreshes_cached_summary() {
        let market = Market::new("BTC", "USD");
        assert!(market.summary().is_none());

        market.record_ticker(&Ticker {
            last: Decimal::from(10),
            bid: Decimal::from(9),
            ask: Decimal::from(11),
        });

        let summary = market.summary().unwrap();
        assert_eq!(summary.last, Decimal::from(10));
        assert_eq!(summary.high, Decimal::ZERO);
    }
}
