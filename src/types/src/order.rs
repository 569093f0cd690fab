use crate::{ExchangeError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Ask,
    Bid,
}

impl OrderSide {
    /// Bids are placed by buyers, asks by sellers.
    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Bid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    side: OrderSide,
    price: Decimal,
    quantity: Decimal,
    id: Option<String>,
    timestamp_ms: Option<u64>,
}

impl Order {
    pub fn new(side: OrderSide, price: Decimal, quantity: Decimal) -> Result<Order> {
        if price < Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!("negative price {price}")));
        }
        if quantity < Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "negative quantity {quantity}"
            )));
        }

        Ok(Order {
            side,
            price,
            quantity,
            id: None,
            timestamp_ms: None,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Order {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: u64) -> Order {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn timestamp_ms(&self) -> Option<u64> {
        self.timestamp_ms
    }

    /// Value of the order in the quote currency.
    pub fn total(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Snapshot of the outstanding limit orders of a market, each side ordered best price first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    asks: Vec<Order>,
    bids: Vec<Order>,
}

impl OrderBook {
    /// Partitions orders by their side tag. Asks are sorted ascending by price, bids descending.
    pub fn from_orders(orders: impl IntoIterator<Item = Order>) -> OrderBook {
        let (mut asks, mut bids): (Vec<_>, Vec<_>) = orders
            .into_iter()
            .partition(|o| o.side == OrderSide::Ask);

        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.sort_by(|a, b| b.price.cmp(&a.price));

        OrderBook { asks, bids }
    }

    pub fn asks(&self) -> &[Order] {
        &self.asks
    }

    pub fn bids(&self) -> &[Order] {
        &self.bids
    }

    pub fn best_ask(&self) -> Option<&Order> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&Order> {
        self.bids.first()
    }

    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }
}

/// A limit order about to be submitted. Direction is carried by `side` only, `amount` and `price`
/// are strictly positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLimitOrder {
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Decimal,
}

impl PendingLimitOrder {
    pub fn new(side: OrderSide, amount: Decimal, price: Decimal) -> Result<PendingLimitOrder> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "amount must be positive, got {amount}"
            )));
        }
        if price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "limit must be positive, got {price}"
            )));
        }

        Ok(PendingLimitOrder {
            side,
            amount,
            price,
        })
    }

    pub fn buy(amount: Decimal, price: Decimal) -> Result<PendingLimitOrder> {
        PendingLimitOrder::new(OrderSide::Bid, amount, price)
    }

    pub fn sell(amount: Decimal, price: Decimal) -> Result<PendingLimitOrder> {
        PendingLimitOrder::new(OrderSide::Ask, amount, price)
    }
}
