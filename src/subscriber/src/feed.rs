use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use xb_types::{MarketSummary, Result};

/// Upstream push connection of one exchange, as seen by the subscription manager.
///
/// Implementations own the exchange-level connection and route raw events for each subscribed
/// symbol into the receiver returned by `subscribe`, in the order the exchange delivers them.
#[async_trait]
pub trait SummaryFeed: Send + Sync + 'static {
    type Event: Send + 'static;

    async fn connect(&self) -> Result<()>;

    /// Whether the exchange-level connection is currently up.
    fn is_live(&self) -> bool;

    async fn subscribe(&self, symbol: &str) -> Result<UnboundedReceiver<Self::Event>>;

    async fn unsubscribe(&self, symbol: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn normalize(&self, event: Self::Event) -> Result<MarketSummary>;
}
