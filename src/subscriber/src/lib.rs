mod cache;
mod feed;
mod manager;

pub use cache::SummaryCache;
pub use feed::SummaryFeed;
pub use manager::{FeedState, FeedSubscriptionManager};
