mod api;
mod client;
mod wrapper;

pub use api::{BinanceApi, BookTicker, DailyStats, Depth, SymbolInfo};
pub use client::BinanceRestClient;
pub use wrapper::BinanceWrapper;
