use parking_lot::RwLock;
use std::collections::HashMap;
use xb_types::{Market, MarketSummary};

/// Latest known summary per market, shared by polling calls and feed dispatch tasks.
///
/// Readers proceed in parallel; a write holds the lock exclusively for the single insert. No
/// expiry is applied here, callers decide how much to trust a cached value.
#[derive(Debug, Default)]
pub struct SummaryCache {
    summaries: RwLock<HashMap<String, MarketSummary>>,
}

impl SummaryCache {
    pub fn new() -> SummaryCache {
        SummaryCache::default()
    }

    /// Overwrites the summary for `market`, returning the previous value if there was one.
    pub fn set(&self, market: &Market, summary: MarketSummary) -> Option<MarketSummary> {
        self.set_named(market.name(), summary)
    }

    pub fn get(&self, market: &Market) -> Option<MarketSummary> {
        self.summaries.read().get(market.name()).cloned()
    }

    pub fn len(&self) -> usize {
        self.summaries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.read().is_empty()
    }

    pub(crate) fn set_named(&self, market: &str, summary: MarketSummary) -> Option<MarketSummary> {
        self.summaries.write().insert(market.to_string(), summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn uniform(value: i64) -> MarketSummary {
        let v = Decimal::from(value);
        MarketSummary {
            high: v,
            low: v,
            volume: v,
            bid: v,
            ask: v,
            last: v,
        }
    }

    #[test]
    fn set_returns_previous_value() {
        let cache = SummaryCache::new();
        let market = Market::new("BTC", "USD");

        assert_eq!(cache.set(&market, uniform(1)), None);
        assert_eq!(cache.set(&market, uniform(2)), Some(uniform(1)));
        assert_eq!(cache.get(&market), Some(uniform(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unset_market_is_absent() {
        let cache = SummaryCache::new();
        cache.set(&Market::new("BTC", "USD"), uniform(1));

        assert_eq!(cache.get(&Market::new("ETH", "USD")), None);
    }

    #[test]
    fn concurrent_readers_never_see_partial_writes() {
        let cache = Arc::new(SummaryCache::new());
        let markets: Vec<_> = (0..8)
            .map(|i| Market::new(format!("C{i}"), "USD"))
            .collect();

        std::thread::scope(|scope| {
            for market in &markets {
                let cache = cache.clone();
                scope.spawn(move || {
                    for value in 0..500 {
                        cache.set(market, uniform(value));
                    }
                });
            }
            for _ in 0..4 {
                let cache = cache.clone();
                let markets = &markets;
                scope.spawn(move || {
                    for i in 0..2000 {
                        if let Some(summary) = cache.get(&markets[i % markets.len()]) {
                            assert_eq!(summary, uniform(summary.last.try_into().unwrap()));
                        }
                    }
                });
            }
        });

        for market in &markets {
            assert_eq!(cache.get(market), Some(uniform(499)));
        }
        assert_eq!(cache.len(), markets.len());
    }
}
