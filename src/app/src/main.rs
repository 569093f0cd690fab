use std::env;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tracing::{error, info, warn};
use xb_registry::{init_markets, ExchangeRegistry};
use xb_types::config::ExchangeConfig;
use xb_types::{ExchangeError, ExchangeWrapper, Market, MarketSummary, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_writer(io::stdout).init();

    info!("Service started");

    if let Err(error) = run().await {
        error!("Service failed: {error}");
    }

    info!("Service stopped");
}

async fn run() -> Result<()> {
    let exchange = env::var("EXCHANGE").unwrap_or_else(|_| "bitfinex".to_string());
    let market_name = env::var("MARKET").unwrap_or_else(|_| "BTC-USD".to_string());

    let wrapper = ExchangeRegistry::default().build(&exchange_config(&exchange))?;
    let markets = init_markets(wrapper.as_ref()).await?;
    info!("{}: {} markets available", wrapper.name(), markets.len());

    let market = markets
        .get(&market_name)
        .cloned()
        .ok_or(ExchangeError::NotFound(market_name))?;

    log_summary(wrapper.name(), &market, &wrapper.get_market_summary(&market).await?);

    let name = wrapper.name().to_string();
    let logged_market = market.clone();
    let on_update = Arc::new(move |summary: MarketSummary| {
        log_summary(&name, &logged_market, &summary);
    });

    match wrapper.subscribe_market_summary_feed(&market, on_update).await {
        Ok(subscription) => {
            wait_for_shutdown().await?;
            wrapper
                .unsubscribe_market_summary_feed(&market, subscription)
                .await
        }
        Err(ExchangeError::FeedUnsupported(_)) => {
            warn!("{}: No push feed, polling every {POLL_INTERVAL:?}", wrapper.name());
            poll_until_shutdown(wrapper.as_ref(), &market).await
        }
        Err(error) => Err(error),
    }
}

async fn poll_until_shutdown(wrapper: &dyn ExchangeWrapper, market: &Market) -> Result<()> {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.tick().await;

    loop {
        select! {
            _ = interval.tick() => {
                match wrapper.get_market_summary(market).await {
                    Ok(summary) => log_summary(wrapper.name(), market, &summary),
                    Err(error) => warn!("{}: Polling {} failed: {error}", wrapper.name(), market.name()),
                }
            },
            shutdown = wait_for_shutdown() => {
                return shutdown;
            }
        }
    }
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;
    info!("Service stopping");
    Ok(())
}

fn exchange_config(exchange: &str) -> ExchangeConfig {
    let prefix = exchange.to_uppercase();

    ExchangeConfig {
        exchange: exchange.to_string(),
        public_key: env::var(format!("{prefix}_PUBLIC_KEY")).unwrap_or_default(),
        secret_key: env::var(format!("{prefix}_SECRET_KEY")).unwrap_or_default(),
    }
}

fn log_summary(exchange: &str, market: &Market, summary: &MarketSummary) {
    info!(
        "{exchange}: {} last {} bid {} ask {} high {} low {} volume {}",
        market.name(),
        summary.last,
        summary.bid,
        summary.ask,
        summary.high,
        summary.low,
        summary.volume
    );
}
