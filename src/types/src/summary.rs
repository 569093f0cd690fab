use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
}

/// Aggregate statistics of a market over the exchange's reporting window (usually 24h).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
}

impl MarketSummary {
    pub fn update_from_ticker(&mut self, ticker: &Ticker) {
        self.last = ticker.last;
        self.bid = ticker.bid;
        self.ask = ticker.ask;
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

impl From<&MarketSummary> for Ticker {
    fn from(summary: &MarketSummary) -> Ticker {
        Ticker {
            last: summary.last,
            bid: summary.bid,
            ask: summary.ask,
        }
    }
}
