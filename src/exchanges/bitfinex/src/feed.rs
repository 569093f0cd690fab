use crate::api::summary_from_ticker;
use async_trait::async_trait;
use ezsockets::client::ClientCloseMode;
use ezsockets::{ClientConfig, ClientExt, Error, WSError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{info, trace, warn};
use xb_subscriber::SummaryFeed;
use xb_types::{ExchangeError, MarketSummary, Result};

const URL: &str = "wss://api-pub.bitfinex.com/ws/2";

type TickerUpdate = Vec<f64>;

/// Bitfinex websocket ticker channels, one channel per subscribed symbol.
#[derive(Default)]
pub struct BitfinexFeed {
    handle: tokio::sync::Mutex<Option<ezsockets::Client<WebSocketClient>>>,
    routes: Arc<Mutex<Routes>>,
    live: Arc<AtomicBool>,
}

impl BitfinexFeed {
    async fn send(&self, request: &Request<'_>) -> Result<()> {
        let json = serde_json::to_string(request).map_err(|e| ExchangeError::data("request", e))?;
        trace!("Bitfinex: Sending message: {json}");

        let handle = self.handle.lock().await;
        let handle = handle
            .as_ref()
            .ok_or_else(|| ExchangeError::Connectivity("Bitfinex: feed is not connected".to_string()))?;
        handle
            .text(json)
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SummaryFeed for BitfinexFeed {
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
                warn!("Bitfinex: Connection ended with error: {error}");
            }
        });

        match ready_receiver.await {
            Ok(Ok(())) => {
                *handle = Some(client);
                Ok(())
            }
            Ok(Err(error)) => Err(ExchangeError::Connectivity(format!("Bitfinex: {error}"))),
            Err(_) => Err(ExchangeError::Connectivity(
                "Bitfinex: connection closed before it was established".to_string(),
            )),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    async fn subscribe(&self, symbol: &str) -> Result<UnboundedReceiver<TickerUpdate>> {
        let (sender, receiver) = unbounded_channel();
        let (confirmed, confirmation) = oneshot::channel();
        self.routes.lock().pending.insert(
            symbol.to_string(),
            PendingSubscription { sender, confirmed },
        );

        let request = Request::Subscribe {
            channel: "ticker",
            symbol,
        };
        if let Err(error) = self.send(&request).await {
            self.routes.lock().pending.remove(symbol);
            return Err(error);
        }

        match confirmation.await {
            Ok(Ok(())) => Ok(receiver),
            Ok(Err(error)) => Err(ExchangeError::Connectivity(format!(
                "Bitfinex: subscribing to {symbol} failed: {error}"
            ))),
            Err(_) => Err(ExchangeError::Connectivity(format!(
                "Bitfinex: connection closed while subscribing to {symbol}"
            ))),
        }
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<()> {
        let channel = self.routes.lock().remove(symbol);

        match channel {
            Some(chan_id) if self.is_live() => self.send(&Request::Unsubscribe { chan_id }).await,
            _ => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.live.store(false, Ordering::Release);
        self.routes.lock().clear("disconnected");

        if let Some(handle) = self.handle.lock().await.take() {
            handle
                .close(None)
                .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;
            info!("Bitfinex: Disconnected");
        }
        Ok(())
    }

    fn normalize(&self, event: TickerUpdate) -> Result<MarketSummary> {
        summary_from_ticker(&event)
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
        trace!("Bitfinex: Received text: {text}");
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
        info!("Bitfinex: Connected");
        self.live.store(true, Ordering::Release);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        }
        Ok(())
    }

    async fn on_disconnect(&mut self) -> std::result::Result<ClientCloseMode, Error> {
        info!("Bitfinex: Disconnected");
        self.live.store(false, Ordering::Release);
        self.routes.lock().clear("connection lost");
        Ok(ClientCloseMode::Close)
    }

    async fn on_connect_fail(
        &mut self,
        error: WSError,
    ) -> std::result::Result<ClientCloseMode, Error> {
        warn!("Bitfinex: Failed to connect: {error:?}");
        self.live.store(false, Ordering::Release);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(error.to_string()));
        }
        Ok(ClientCloseMode::Close)
    }
}

struct PendingSubscription {
    sender: UnboundedSender<TickerUpdate>,
    confirmed: oneshot::Sender<std::result::Result<(), String>>,
}

/// Where each ticker channel's updates go. Symbols wait in `pending` until Bitfinex confirms
/// the subscription with a channel id.
#[derive(Default)]
struct Routes {
    pending: HashMap<String, PendingSubscription>,
    channels: HashMap<u64, UnboundedSender<TickerUpdate>>,
    channel_ids: HashMap<String, u64>,
}

impl Routes {
    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<Message>(text) {
            Ok(Message::Event(event)) => self.on_event(event),
            Ok(Message::Channel(chan_id, payload)) => self.on_channel(chan_id, payload),
            Err(error) => warn!("Bitfinex: Unrecognised message {text}: {error}"),
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Subscribed { chan_id, symbol } => {
                if let Some(pending) = self.pending.remove(&symbol) {
                    self.channels.insert(chan_id, pending.sender);
                    self.channel_ids.insert(symbol, chan_id);
                    let _ = pending.confirmed.send(Ok(()));
                }
            }
            Event::Unsubscribed { chan_id } => {
                trace!("Bitfinex: Channel {chan_id} closed");
            }
            Event::Error { msg, symbol } => match symbol.and_then(|s| self.pending.remove(&s)) {
                Some(pending) => {
                    let _ = pending.confirmed.send(Err(msg));
                }
                None => {
                    warn!("Bitfinex: Error event: {msg}");
                    for (_, pending) in self.pending.drain() {
                        let _ = pending.confirmed.send(Err(msg.clone()));
                    }
                }
            },
            Event::Other => {}
        }
    }

    fn on_channel(&mut self, chan_id: u64, payload: Value) {
        if payload.as_str() == Some("hb") {
            return;
        }

        let Some(sender) = self.channels.get(&chan_id) else {
            trace!("Bitfinex: Update for unknown channel {chan_id}");
            return;
        };

        match serde_json::from_value::<TickerUpdate>(payload) {
            Ok(values) => {
                let _ = sender.send(values);
            }
            Err(error) => warn!("Bitfinex: Malformed update on channel {chan_id}: {error}"),
        }
    }

    fn remove(&mut self, symbol: &str) -> Option<u64> {
        self.pending.remove(symbol);
        let chan_id = self.channel_ids.remove(symbol)?;
        self.channels.remove(&chan_id);
        Some(chan_id)
    }

    fn clear(&mut self, reason: &str) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.confirmed.send(Err(reason.to_string()));
        }
        self.channels.clear();
        self.channel_ids.clear();
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Message {
    Event(Event),
    Channel(u64, Value),
}

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Event {
    Subscribed {
        #[serde(rename = "chanId")]
        chan_id: u64,
        symbol: String,
    },
    Unsubscribed {
        #[serde(rename = "chanId")]
        chan_id: u64,
    },
    Error {
        msg: String,
        symbol: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Request<'a> {
    Subscribe {
        channel: &'a str,
        symbol: &'a str,
    },
    Unsubscribe {
        #[serde(rename = "chanId")]
        chan_id: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(routes: &mut Routes, symbol: &str) -> (
        UnboundedReceiver<TickerUpdate>,
        oneshot::Receiver<std::result::Result<(), String>>,
    ) {
        let (sender, receiver) = unbounded_channel();
        let (confirmed, confirmation) = oneshot::channel();
        routes
            .pending
            .insert(symbol.to_string(), PendingSubscription { sender, confirmed });
        (receiver, confirmation)
    }

    #[test]
    fn updates_are_routed_by_channel_after_confirmation() {
        let mut routes = Routes::default();
        let (mut btc, mut confirmation) = pending(&mut routes, "tBTCUSD");

        routes.handle_text(r#"{"event":"info","version":2}"#);
        routes.handle_text(
            r#"{"event":"subscribed","channel":"ticker","chanId":17,"symbol":"tBTCUSD","pair":"BTCUSD"}"#,
        );
        routes.handle_text("[17,[1,2,3,4,5,0.1,7,8,9,10]]");
        routes.handle_text(r#"[17,"hb"]"#);
        routes.handle_text("[18,[1,2,3,4,5,0.1,7,8,9,10]]");

        assert_eq!(confirmation.try_recv().unwrap(), Ok(()));
        assert_eq!(btc.try_recv().unwrap()[6], 7.0);
        assert!(btc.try_recv().is_err());
    }

    #[test]
    fn error_event_fails_the_pending_subscription() {
        let mut routes = Routes::default();
        let (_receiver, mut confirmation) = pending(&mut routes, "tFOOBAR");

        routes.handle_text(r#"{"event":"error","msg":"symbol: invalid","code":10300,"symbol":"tFOOBAR"}"#);

        assert_eq!(
            confirmation.try_recv().unwrap(),
            Err("symbol: invalid".to_string())
        );
        assert!(routes.pending.is_empty());
    }

    #[test]
    fn removing_a_symbol_closes_its_route() {
        let mut routes = Routes::default();
        let (mut btc, _confirmation) = pending(&mut routes, "tBTCUSD");
        routes.handle_text(r#"{"event":"subscribed","channel":"ticker","chanId":5,"symbol":"tBTCUSD"}"#);

        assert_eq!(routes.remove("tBTCUSD"), Some(5));
        assert!(routes.channels.is_empty());
        assert!(btc.try_recv().is_err());
    }

    #[test]
    fn subscribe_request_shape() {
        let json = serde_json::to_string(&Request::Subscribe {
            channel: "ticker",
            symbol: "tBTCUSD",
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"subscribe","channel":"ticker","symbol":"tBTCUSD"}"#);

        let json = serde_json::to_string(&Request::Unsubscribe { chan_id: 5 }).unwrap();
        assert_eq!(json, r#"{"event":"unsubscribe","chanId":5}"#);
    }
}
