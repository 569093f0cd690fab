use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Fee tier of a trade: makers add liquidity to the book, takers remove it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Maker,
    Taker,
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maker" => Ok(TradeType::Maker),
            "taker" => Ok(TradeType::Taker),
            _ => Err(format!("unknown trade type: {s}")),
        }
    }
}

impl Display for TradeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::Maker => f.write_str("maker"),
            TradeType::Taker => f.write_str("taker"),
        }
    }
}

/// Fixed fee rates of an exchange, as a fraction of the traded value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub maker: Decimal,
    pub taker: Decimal,
}

impl FeeSchedule {
    pub const fn new(maker: Decimal, taker: Decimal) -> FeeSchedule {
        FeeSchedule { maker, taker }
    }

    pub fn rate(&self, trade_type: TradeType) -> Decimal {
        match trade_type {
            TradeType::Maker => self.maker,
            TradeType::Taker => self.taker,
        }
    }

    pub fn trading_fee(&self, amount: Decimal, limit: Decimal, trade_type: TradeType) -> Decimal {
        amount * limit * self.rate(trade_type)
    }
}
