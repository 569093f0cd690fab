mod api;
mod client;
mod feed;
mod wrapper;

pub use api::{BitfinexApi, BookEntry};
pub use client::BitfinexRestClient;
pub use feed::BitfinexFeed;
pub use wrapper::BitfinexWrapper;
