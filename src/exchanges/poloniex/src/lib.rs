mod api;
mod client;
mod feed;
mod wrapper;

pub use api::{BookSnapshot, PoloniexApi, TickerEntry};
pub use client::PoloniexRestClient;
pub use feed::PoloniexFeed;
pub use wrapper::PoloniexWrapper;
