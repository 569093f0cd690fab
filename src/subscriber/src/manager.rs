use crate::{SummaryCache, SummaryFeed};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xb_types::{Market, MarketSummary, Result, SubscriptionId, SummaryCallback};

type StopSignal = oneshot::Sender<oneshot::Sender<()>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeedState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// Multiplexes market summary subscriptions of one exchange onto its push feed.
///
/// Each watched market has exactly one upstream subscription and one dispatch task, however many
/// callbacks are registered for it. Every event is written to the [`SummaryCache`] and then handed
/// to each callback's own worker task, so a slow callback never holds up the feed.
pub struct FeedSubscriptionManager<F: SummaryFeed> {
    exchange: String,
    feed: Arc<F>,
    cache: Arc<SummaryCache>,
    connected: AtomicBool,
    next_id: AtomicU64,
    markets: Mutex<HashMap<String, MarketFeed>>,
}

struct MarketFeed {
    symbol: String,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    stop: Option<StopSignal>,
    dispatcher: Option<JoinHandle<()>>,
}

struct Subscriber {
    id: SubscriptionId,
    updates: UnboundedSender<MarketSummary>,
    cancellation_token: CancellationToken,
    worker: JoinHandle<()>,
}

impl<F: SummaryFeed> FeedSubscriptionManager<F> {
    pub fn new(
        exchange: impl Into<String>,
        feed: Arc<F>,
        cache: Arc<SummaryCache>,
    ) -> FeedSubscriptionManager<F> {
        FeedSubscriptionManager {
            exchange: exchange.into(),
            feed,
            cache,
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            markets: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<SummaryCache> {
        &self.cache
    }

    /// Opens the exchange-level connection, or reopens it after the exchange dropped it. Failures
    /// are returned immediately, nothing is retried.
    pub async fn connect(&self) -> Result<()> {
        let mut markets = self.markets.lock().await;
        self.ensure_connected(&mut markets).await?;
        Ok(())
    }

    /// True while the exchange-level connection is confirmed up.
    pub fn is_live(&self) -> bool {
        self.connected.load(Ordering::Acquire) && self.feed.is_live()
    }

    /// Registers `on_update` for `market`, opening the upstream subscription for `symbol` if this
    /// is the first registration for the market.
    pub async fn subscribe(
        &self,
        market: &Market,
        symbol: &str,
        on_update: SummaryCallback,
    ) -> Result<SubscriptionId> {
        let mut markets = self.markets.lock().await;
        let opened = self.ensure_connected(&mut markets).await?;
        let idle = markets.is_empty();

        let market_feed = match markets.entry(market.name().to_string()) {
            Entry::Occupied(e) => {
                let market_feed = e.into_mut();
                if market_feed.dispatcher.is_none() {
                    self.resume(market.name(), market_feed).await?;
                }
                market_feed
            }
            Entry::Vacant(e) => {
                debug!(
                    "{}: {} {:?} -> {:?}",
                    self.exchange,
                    market.name(),
                    FeedState::Unsubscribed,
                    FeedState::Subscribing
                );
                let events = match self.feed.subscribe(symbol).await {
                    Ok(events) => events,
                    Err(error) => {
                        if opened && idle {
                            if let Err(error) = self.disconnect_idle().await {
                                warn!("{}: Failed to disconnect feed: {error}", self.exchange);
                            }
                        }
                        return Err(error);
                    }
                };
                let market_feed = e.insert(self.start_dispatch(market.name(), symbol, events));
                info!("{}: Subscribed to {} ({symbol})", self.exchange, market.name());
                market_feed
            }
        };

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        market_feed
            .subscribers
            .write()
            .push(Subscriber::spawn(id, on_update));
        trace!(
            "{}: Registered {id} for {}, {} registration(s)",
            self.exchange,
            market.name(),
            market_feed.subscribers.read().len()
        );
        Ok(id)
    }

    /// Removes the registration `id` for `market`. Releasing the last registration of a market
    /// stops its dispatch task and upstream subscription; releasing the last market closes the
    /// exchange-level connection.
    pub async fn unsubscribe(&self, market: &Market, id: SubscriptionId) -> Result<()> {
        let mut markets = self.markets.lock().await;

        let Some(market_feed) = markets.get(market.name()) else {
            debug!("{}: {} is not subscribed", self.exchange, market.name());
            return Ok(());
        };

        let removed = {
            let mut subscribers = market_feed.subscribers.write();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|i| subscribers.remove(i))
        };
        let Some(subscriber) = removed else {
            debug!("{}: {id} is not registered for {}", self.exchange, market.name());
            return Ok(());
        };
        subscriber.stop(&self.exchange).await;

        if !market_feed.subscribers.read().is_empty() {
            return Ok(());
        }

        if let Some(market_feed) = markets.remove(market.name()) {
            market_feed.shut_down(&self.exchange, market.name(), self.feed.as_ref()).await;
            info!("{}: Unsubscribed from {}", self.exchange, market.name());
        }

        if markets.is_empty() {
            self.disconnect_idle().await?;
        }

        Ok(())
    }

    /// Cached summary of `market`, provided it comes from a subscription that is still being fed.
    /// Summaries written by polling are ignored.
    pub async fn pushed_summary(&self, market: &Market) -> Option<MarketSummary> {
        let markets = self.markets.lock().await;
        if !self.is_live() || !markets.contains_key(market.name()) {
            return None;
        }
        self.cache.get(market)
    }

    /// Settled state of `market`. Transitions run under the markets lock, so `Subscribing` and
    /// `Unsubscribing` are only ever seen in the logs.
    pub async fn state(&self, market: &Market) -> FeedState {
        if self.markets.lock().await.contains_key(market.name()) {
            FeedState::Subscribed
        } else {
            FeedState::Unsubscribed
        }
    }

    pub async fn subscriber_count(&self, market: &Market) -> usize {
        self.markets
            .lock()
            .await
            .get(market.name())
            .map_or(0, |m| m.subscribers.read().len())
    }

    pub async fn active_markets(&self) -> usize {
        self.markets.lock().await.len()
    }

    /// Connects unless the connection is already live. Markets still registered from a dropped
    /// connection are resubscribed on the new one. Returns whether a connection was opened.
    async fn ensure_connected(&self, markets: &mut HashMap<String, MarketFeed>) -> Result<bool> {
        if self.is_live() {
            return Ok(false);
        }
        if self.connected.swap(false, Ordering::AcqRel) {
            warn!("{}: Feed connection lost, reconnecting", self.exchange);
        }

        self.feed.connect().await?;
        self.connected.store(true, Ordering::Release);
        info!("{}: Feed connected", self.exchange);

        for (market, market_feed) in markets.iter_mut() {
            if let Err(error) = self.resume(market, market_feed).await {
                warn!("{}: Failed to resubscribe {market}: {error}", self.exchange);
            }
        }
        Ok(true)
    }

    /// Replaces the upstream subscription and dispatch task of `market`, keeping its callbacks.
    async fn resume(&self, market: &str, market_feed: &mut MarketFeed) -> Result<()> {
        market_feed.stop_dispatch(&self.exchange, market, self.feed.as_ref()).await;

        let events = self.feed.subscribe(&market_feed.symbol).await?;
        let (stop, dispatcher) = self.spawn_dispatch(
            market,
            &market_feed.symbol,
            market_feed.subscribers.clone(),
            events,
        );
        market_feed.stop = Some(stop);
        market_feed.dispatcher = Some(dispatcher);
        info!("{}: Resubscribed to {market} ({})", self.exchange, market_feed.symbol);
        Ok(())
    }

    async fn disconnect_idle(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!("{}: No markets left, disconnecting feed", self.exchange);
            self.feed.disconnect().await?;
        }
        Ok(())
    }

    fn start_dispatch(
        &self,
        market: &str,
        symbol: &str,
        events: UnboundedReceiver<F::Event>,
    ) -> MarketFeed {
        let subscribers = Arc::new(RwLock::new(Vec::new()));
        let (stop, dispatcher) = self.spawn_dispatch(market, symbol, subscribers.clone(), events);

        MarketFeed {
            symbol: symbol.to_string(),
            subscribers,
            stop: Some(stop),
            dispatcher: Some(dispatcher),
        }
    }

    fn spawn_dispatch(
        &self,
        market: &str,
        symbol: &str,
        subscribers: Arc<RwLock<Vec<Subscriber>>>,
        events: UnboundedReceiver<F::Event>,
    ) -> (StopSignal, JoinHandle<()>) {
        let (stop, stop_receiver) = oneshot::channel();

        let dispatcher = tokio::spawn(dispatch(
            Dispatch {
                exchange: self.exchange.clone(),
                market: market.to_string(),
                symbol: symbol.to_string(),
                feed: self.feed.clone(),
                cache: self.cache.clone(),
                subscribers,
            },
            events,
            stop_receiver,
        ));

        (stop, dispatcher)
    }
}

impl MarketFeed {
    async fn shut_down<F: SummaryFeed>(mut self, exchange: &str, market: &str, feed: &F) {
        debug!(
            "{exchange}: {market} {:?} -> {:?}",
            FeedState::Subscribed,
            FeedState::Unsubscribing
        );
        self.stop_dispatch(exchange, market, feed).await;
        debug!(
            "{exchange}: {market} {:?} -> {:?}",
            FeedState::Unsubscribing,
            FeedState::Unsubscribed
        );
    }

    /// Stops the dispatch task and releases the upstream subscription.
    async fn stop_dispatch<F: SummaryFeed>(&mut self, exchange: &str, market: &str, feed: &F) {
        let (ack, ack_receiver) = oneshot::channel();
        let acknowledged = match self.stop.take() {
            Some(stop) => stop.send(ack).is_ok() && ack_receiver.await.is_ok(),
            None => false,
        };

        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(error) = dispatcher.await {
                warn!("{exchange}: Dispatch task for {market} failed: {error}");
            }
        }

        // The dispatch task releases the upstream subscription before acknowledging, unless it
        // died first.
        if !acknowledged {
            if let Err(error) = feed.unsubscribe(&self.symbol).await {
                warn!("{exchange}: Failed to unsubscribe {}: {error}", self.symbol);
            }
        }
    }
}

impl Subscriber {
    fn spawn(id: SubscriptionId, on_update: SummaryCallback) -> Subscriber {
        let (updates, mut receiver) = unbounded_channel();
        let cancellation_token = CancellationToken::new();

        let worker = tokio::spawn({
            let cancellation_token = cancellation_token.clone();
            async move {
                loop {
                    select! {
                        biased;
                        _ = cancellation_token.cancelled() => break,
                        next = receiver.recv() => match next {
                            Some(summary) => on_update(summary),
                            None => break,
                        },
                    }
                }
            }
        });

        Subscriber {
            id,
            updates,
            cancellation_token,
            worker,
        }
    }

    /// Waits for a callback that is already running, drops any queued updates.
    async fn stop(self, exchange: &str) {
        self.cancellation_token.cancel();
        drop(self.updates);
        if let Err(error) = self.worker.await {
            warn!("{exchange}: Callback {} failed: {error}", self.id);
        }
    }
}

struct Dispatch<F: SummaryFeed> {
    exchange: String,
    market: String,
    symbol: String,
    feed: Arc<F>,
    cache: Arc<SummaryCache>,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl<F: SummaryFeed> Dispatch<F> {
    fn publish(&self, event: F::Event) {
        let summary = match self.feed.normalize(event) {
            Ok(summary) => summary,
            Err(error) => {
                warn!("{}: Dropping update for {}: {error}", self.exchange, self.market);
                return;
            }
        };

        trace!("{}: Update for {}: {summary:?}", self.exchange, self.market);
        self.cache.set_named(&self.market, summary.clone());

        for subscriber in self.subscribers.read().iter() {
            // A closed worker is being removed by `unsubscribe` or has panicked.
            let _ = subscriber.updates.send(summary.clone());
        }
    }
}

async fn dispatch<F: SummaryFeed>(
    dispatch: Dispatch<F>,
    mut events: UnboundedReceiver<F::Event>,
    mut stop: oneshot::Receiver<oneshot::Sender<()>>,
) {
    let mut open = true;

    let ack = loop {
        select! {
            ack = &mut stop => break ack.ok(),
            next = events.recv(), if open => match next {
                Some(event) => dispatch.publish(event),
                None => {
                    warn!("{}: Feed for {} closed upstream", dispatch.exchange, dispatch.market);
                    open = false;
                }
            },
        }
    };

    drop(events);
    if let Err(error) = dispatch.feed.unsubscribe(&dispatch.symbol).await {
        warn!(
            "{}: Failed to unsubscribe {}: {error}",
            dispatch.exchange, dispatch.symbol
        );
    }

    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}
