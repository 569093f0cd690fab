use crate::{ExchangeError, Order, OrderSide, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| ExchangeError::data(field, value))
}

pub fn decimal_from_f64(field: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| ExchangeError::data(field, value))
}

/// Reads element `index` of an array-valued upstream field.
pub fn select<'a, T>(field: &str, values: &'a [T], index: usize) -> Result<&'a T> {
    values
        .get(index)
        .ok_or_else(|| ExchangeError::data(field, format!("no element at index {index}")))
}

pub fn order_from_strings(side: OrderSide, price: &str, quantity: &str) -> Result<Order> {
    let price = parse_decimal("price", price)?;
    let quantity = parse_decimal("quantity", quantity)?;
    Order::new(side, price, quantity)
        .map_err(|_| ExchangeError::data("order", format!("{price}@{quantity}")))
}

/// Which element of each array-valued ticker field is authoritative.
///
/// Exchanges such as Kraken report `[today, last 24h]` or `[price, whole lot volume, lot volume]`
/// tuples for their ticker fields. The default reads element 0 of every field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TickerFieldPolicy {
    pub last: usize,
    pub bid: usize,
    pub ask: usize,
    pub volume: usize,
    pub high: usize,
    pub low: usize,
}

impl TickerFieldPolicy {
    /// Reads volume, high and low from the rolling 24h window instead of the current day.
    pub fn rolling_24h() -> TickerFieldPolicy {
        TickerFieldPolicy {
            volume: 1,
            high: 1,
            low: 1,
            ..TickerFieldPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0.1234", "0.1234")]
    #[test_case("1e-3", "0.001")]
    #[test_case("42", "42")]
    fn parse_valid(input: &str, expected: &str) {
        assert_eq!(
            parse_decimal("last", input).unwrap(),
            Decimal::from_str(expected).unwrap()
        );
    }

    #[test]
    fn parse_invalid_names_field() {
        let error = parse_decimal("last", "n/a").unwrap_err();
        assert_eq!(error, ExchangeError::data("last", "n/a"));
    }

    #[test]
    fn nan_is_a_data_error() {
        assert!(decimal_from_f64("volume", f64::NAN).is_err());
    }

    #[test]
    fn select_out_of_range_is_a_data_error() {
        let values = vec!["1".to_string()];
        assert_eq!(select("high", &values, 0).unwrap(), "1");
        assert!(matches!(select("high", &values, 1), Err(ExchangeError::Data { .. })));
    }

    #[test]
    fn negative_row_is_rejected() {
        assert!(order_from_strings(OrderSide::Bid, "-1", "2").is_err());
    }
}
