mod api;
mod client;
mod wrapper;

pub use api::{AssetPair, Depth, KrakenApi, TickerInfo};
pub use client::KrakenRestClient;
pub use wrapper::KrakenWrapper;
