use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use xb_exchanges_binance::BinanceWrapper;
use xb_exchanges_bitfinex::BitfinexWrapper;
use xb_exchanges_kraken::KrakenWrapper;
use xb_exchanges_poloniex::PoloniexWrapper;
use xb_types::config::ExchangeConfig;
use xb_types::{ExchangeError, ExchangeWrapper, Market, Result};

pub type ExchangeConstructor =
    Box<dyn Fn(&ExchangeConfig) -> Result<Arc<dyn ExchangeWrapper>> + Send + Sync>;

/// Maps exchange identifiers to the constructors of their wrappers.
pub struct ExchangeRegistry {
    exchanges: HashMap<String, ExchangeConstructor>,
}

impl ExchangeRegistry {
    /// An empty registry. [`ExchangeRegistry::default`] has the built-in exchanges registered.
    pub fn new() -> ExchangeRegistry {
        ExchangeRegistry {
            exchanges: HashMap::new(),
        }
    }

    pub fn with_exchange<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn(&ExchangeConfig) -> Result<Arc<dyn ExchangeWrapper>> + Send + Sync + 'static,
    {
        self.exchanges.insert(name.to_lowercase(), Box::new(constructor));
        self
    }

    /// Builds the wrapper for `config.exchange`, matched case-insensitively.
    pub fn build(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeWrapper>> {
        let constructor = self
            .exchanges
            .get(&config.exchange.to_lowercase())
            .ok_or_else(|| ExchangeError::UnknownExchange(config.exchange.clone()))?;

        let wrapper = constructor(config)?;
        info!("Built wrapper for {}", wrapper.name());
        Ok(wrapper)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.exchanges.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        ExchangeRegistry::new()
            .with_exchange(BinanceWrapper::NAME, |config| {
                Ok(Arc::new(BinanceWrapper::new(
                    config.public_key.clone(),
                    config.secret_key.clone(),
                )))
            })
            .with_exchange(BitfinexWrapper::NAME, |config| {
                Ok(Arc::new(BitfinexWrapper::new(
                    config.public_key.clone(),
                    config.secret_key.clone(),
                )))
            })
            .with_exchange(KrakenWrapper::NAME, |config| {
                Ok(Arc::new(KrakenWrapper::new(
                    config.public_key.clone(),
                    config.secret_key.clone(),
                )))
            })
            .with_exchange(PoloniexWrapper::NAME, |config| {
                Ok(Arc::new(PoloniexWrapper::new(
                    config.public_key.clone(),
                    config.secret_key.clone(),
                )))
            })
    }
}

/// Fetches the markets of `wrapper`, keyed by market name. If the exchange reports a name more
/// than once the last one wins.
pub async fn init_markets(wrapper: &dyn ExchangeWrapper) -> Result<HashMap<String, Arc<Market>>> {
    let markets = wrapper.get_markets().await?;
    let mut registry = HashMap::with_capacity(markets.len());

    for market in markets {
        let name = market.name().to_string();
        if registry.insert(name.clone(), Arc::new(market)).is_some() {
            warn!("{}: Market {name} listed more than once, keeping the last", wrapper.name());
        }
    }

    debug!("{}: Initialised {} markets", wrapper.name(), registry.len());
    Ok(registry)
}
