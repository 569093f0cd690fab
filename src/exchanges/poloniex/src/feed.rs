use crate::api::{summary_from_update, PoloniexApi, PAIR_ID};
use async_trait::async_trait;
use ezsockets::client::ClientCloseMode;
use ezsockets::{ClientConfig, ClientExt, Error, WSError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use xb_subscriber::SummaryFeed;
use xb_types::{ExchangeError, MarketSummary, Result};

const URL: &str = "wss://api2.poloniex.com";
const TICKER_CHANNEL: u64 = 1002;
const HEARTBEAT_CHANNEL: u64 = 1010;

type TickerUpdate = Vec<Value>;

/// The Poloniex ticker channel. A single upstream channel carries every pair, so it is opened
/// for the first market and closed with the last, updates being routed by pair id in between.
pub struct PoloniexFeed {
    api: Arc<dyn PoloniexApi>,
    handle: tokio::sync::Mutex<Option<ezsockets::Client<WebSocketClient>>>,
    routes: Arc<Mutex<Routes>>,
    live: Arc<AtomicBool>,
}

impl PoloniexFeed {
    pub fn new(api: Arc<dyn PoloniexApi>) -> PoloniexFeed {
        PoloniexFeed {
            api,
            handle: tokio::sync::Mutex::new(None),
            routes: Arc::default(),
            live: Arc::default(),
        }
    }

    async fn pair_id(&self, pair: &str) -> Result<u64> {
        self.api
            .tickers()
            .await?
            .get(pair)
            .map(|ticker| ticker.id)
            .ok_or_else(|| ExchangeError::NotFound(pair.to_string()))
    }

    async fn send(&self, command: &'static str) -> Result<()> {
        let json = serde_json::to_string(&Command {
            command,
            channel: TICKER_CHANNEL,
        })
        .map_err(|e| ExchangeError::data("command", e))?;
        trace!("Poloniex: Sending message: {json}");

        let handle = self.handle.lock().await;
        let handle = handle
            .as_ref()
            .ok_or_else(|| ExchangeError::Connectivity("Poloniex: feed is not connected".to_string()))?;
        handle
            .text(json)
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SummaryFeed for PoloniexFeed {
    type Event = TickerUpdate;

    async fn connect(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() && self.live.load(Ordering::Acquire) {
            return Ok(());
        }

        let (ready, ready_receiver) = oneshot::channel();
        let routes = self.routes.clone();
        let live = self.live.clone();
        let (client, future) = ezsockets::connect(
            |handle| WebSocketClient {
                handle,
                routes,
                live,
                ready: Some(ready),
            },
            ClientConfig::new(URL),
        )
        .await;

        tokio::spawn(async move {
            if let Err(error) = future.await {
                warn!("Poloniex: Connection ended with error: {error}");
            }
        });

        match ready_receiver.await {
            Ok(Ok(())) => {
                *handle = Some(client);
                Ok(())
            }
            Ok(Err(error)) => Err(ExchangeError::Connectivity(format!("Poloniex: {error}"))),
            Err(_) => Err(ExchangeError::Connectivity(
                "Poloniex: connection closed before it was established".to_string(),
            )),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    async fn subscribe(&self, symbol: &str) -> Result<UnboundedReceiver<TickerUpdate>> {
        let pair_id = self.pair_id(symbol).await?;
        let (sender, receiver) = unbounded_channel();

        let first = self.routes.lock().add(symbol, pair_id, sender);
        if first {
            if let Err(error) = self.send("subscribe").await {
                self.routes.lock().remove(symbol);
                return Err(error);
            }
            info!("Poloniex: Subscribed to the ticker channel");
        }
        Ok(receiver)
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<()> {
        let last = self.routes.lock().remove(symbol);

        if last && self.is_live() {
            self.send("unsubscribe").await?;
            info!("Poloniex: Unsubscribed from the ticker channel");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.live.store(false, Ordering::Release);
        self.routes.lock().clear();

        if let Some(handle) = self.handle.lock().await.take() {
            handle
                .close(None)
                .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;
            info!("Poloniex: Disconnected");
        }
        Ok(())
    }

    fn normalize(&self, event: TickerUpdate) -> Result<MarketSummary> {
        summary_from_update(&event)
    }
}

struct WebSocketClient {
    handle: ezsockets::Client<Self>,
    routes: Arc<Mutex<Routes>>,
    live: Arc<AtomicBool>,
    ready: Option<oneshot::Sender<std::result::Result<(), String>>>,
}

#[async_trait]
impl ClientExt for WebSocketClient {
    type Call = ();

    async fn on_text(&mut self, text: String) -> std::result::Result<(), Error> {
        trace!("Poloniex: Received text: {text}");
        self.routes.lock().handle_text(&text);
        Ok(())
    }

    async fn on_binary(&mut self, _: Vec<u8>) -> std::result::Result<(), Error> {
        Ok(())
    }

    async fn on_call(&mut self, _: Self::Call) -> std::result::Result<(), Error> {
        Ok(())
    }

    async fn on_connect(&mut self) -> std::result::Result<(), Error> {
        info!("Poloniex: Connected");
        self.live.store(true, Ordering::Release);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        }
        Ok(())
    }

    async fn on_disconnect(&mut self) -> std::result::Result<ClientCloseMode, Error> {
        info!("Poloniex: Disconnected");
        self.live.store(false, Ordering::Release);
        self.routes.lock().clear();
        Ok(ClientCloseMode::Close)
    }

    async fn on_connect_fail(
        &mut self,
        error: WSError,
    ) -> std::result::Result<ClientCloseMode, Error> {
        warn!("Poloniex: Failed to connect: {error:?}");
        self.live.store(false, Ordering::Release);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(error.to_string()));
        }
        Ok(ClientCloseMode::Close)
    }
}

#[derive(Default)]
struct Routes {
    by_pair_id: HashMap<u64, UnboundedSender<TickerUpdate>>,
    pair_ids: HashMap<String, u64>,
}

impl Routes {
    /// Returns true if this is the first routed pair.
    fn add(&mut self, pair: &str, pair_id: u64, sender: UnboundedSender<TickerUpdate>) -> bool {
        let first = self.by_pair_id.is_empty();
        self.by_pair_id.insert(pair_id, sender);
        self.pair_ids.insert(pair.to_string(), pair_id);
        first
    }

    /// Returns true if the last routed pair was removed.
    fn remove(&mut self, pair: &str) -> bool {
        let Some(pair_id) = self.pair_ids.remove(pair) else {
            return false;
        };
        self.by_pair_id.remove(&pair_id);
        self.by_pair_id.is_empty()
    }

    fn clear(&mut self) {
        self.by_pair_id.clear();
        self.pair_ids.clear();
    }

    // [1002, 1] acknowledges the subscription, [1002, null, [PAIR_ID, ...]] is an update and
    // [1010] a heartbeat.
    fn handle_text(&mut self, text: &str) {
        let message = match serde_json::from_str::<Vec<Value>>(text) {
            Ok(message) => message,
            Err(error) => {
                warn!("Poloniex: Unrecognised message {text}: {error}");
                return;
            }
        };

        match (message.first().and_then(Value::as_u64), message.get(2)) {
            (Some(TICKER_CHANNEL), Some(Value::Array(update))) => self.route(update),
            (Some(TICKER_CHANNEL), None) => debug!("Poloniex: Ticker channel acknowledged"),
            (Some(HEARTBEAT_CHANNEL), _) => {}
            _ => trace!("Poloniex: Ignoring message {text}"),
        }
    }

    fn route(&self, update: &[Value]) {
        let Some(pair_id) = update.get(PAIR_ID).and_then(Value::as_u64) else {
            warn!("Poloniex: Ticker update without pair id");
            return;
        };

        if let Some(sender) = self.by_pair_id.get(&pair_id) {
            let _ = sender.send(update.to_vec());
        }
    }
}

#[derive(Serialize)]
struct Command {
    command: &'static str,
    channel: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH_UPDATE: &str = r#"[1002,null,[148,"0.03127000","0.03128000","0.03126001","0.01","1402.49","44847.41",0,"0.03167980","0.03070001"]]"#;
    const LTC_UPDATE: &str = r#"[1002,null,[50,"0.00821","0.00822","0.00820","0.01","12.5","1500.2",0,"0.0083","0.0081"]]"#;

    #[test]
    fn updates_are_routed_by_pair_id() {
        let mut routes = Routes::default();
        let (sender, mut eth) = unbounded_channel();

        assert!(routes.add("BTC_ETH", 148, sender));
        routes.handle_text("[1002,1]");
        routes.handle_text("[1010]");
        routes.handle_text(LTC_UPDATE);
        routes.handle_text(ETH_UPDATE);

        let update = eth.try_recv().unwrap();
        assert_eq!(update[0], 148);
        assert!(eth.try_recv().is_err());
    }

    #[test]
    fn channel_is_only_released_with_the_last_pair() {
        let mut routes = Routes::default();
        let (eth, _eth) = unbounded_channel();
        let (ltc, _ltc) = unbounded_channel();

        assert!(routes.add("BTC_ETH", 148, eth));
        assert!(!routes.add("BTC_LTC", 50, ltc));

        assert!(!routes.remove("BTC_ETH"));
        assert!(!routes.remove("BTC_DOGE"));
        assert!(routes.remove("BTC_LTC"));
    }

    #[test]
    fn routed_update_normalizes() {
        let mut routes = Routes::default();
        let (sender, mut eth) = unbounded_channel();
        routes.add("BTC_ETH", 148, sender);

        routes.handle_text(ETH_UPDATE);

        let summary = summary_from_update(&eth.try_recv().unwrap()).unwrap();
        assert_eq!(summary.ask.to_string(), "0.03128000");
    }

    #[test]
    fn command_shape() {
        let json = serde_json::to_string(&Command {
            command: "subscribe",
            channel: TICKER_CHANNEL,
        })
        .unwrap();
        assert_eq!(json, r#"{"command":"subscribe","channel":1002}"#);
    }
}
