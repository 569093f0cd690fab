mod error;
mod fees;
mod market;
mod order;
mod summary;
mod wrapper;

pub mod config;
pub mod normalize;

pub use error::{ExchangeError, Result};
pub use fees::{FeeSchedule, TradeType};
pub use market::Market;
pub use order::{Order, OrderBook, OrderSide, PendingLimitOrder};
pub use summary::{MarketSummary, Ticker};
pub use wrapper::{market_name_for, ExchangeWrapper, SubscriptionId, SummaryCallback};
