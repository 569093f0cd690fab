use serde::Deserialize;

/// Credentials for one exchange connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub exchange: String,
    pub public_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub name: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub exchanges: Vec<MarketExchangeConfig>,
}

/// The symbol under which an exchange lists a market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketExchangeConfig {
    pub name: String,
    pub market_name: String,
}
