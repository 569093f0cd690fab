use crate::api::{BookSnapshot, PoloniexApi, TickerEntry};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;
use xb_types::{ExchangeError, PendingLimitOrder, Result};

const PUBLIC_URL: &str = "https://poloniex.com/public";
const TRADING_URL: &str = "https://poloniex.com/tradingApi";
const BOOK_DEPTH: u32 = 50;

pub struct PoloniexRestClient {
    api_key: String,
    secret_key: String,
    client: Client,
}

impl PoloniexRestClient {
    pub fn new(api_key: String, secret_key: String) -> PoloniexRestClient {
        PoloniexRestClient {
            api_key,
            secret_key,
            client: Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, query: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{PUBLIC_URL}?{query}"))
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_json(query, response).await
    }

    async fn post_trading<T: DeserializeOwned>(&self, command: &str, params: &str) -> Result<T> {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let body = format!("command={command}&{params}&nonce={nonce}");
        let signature = self.get_signature(&body)?;

        let response = self
            .client
            .post(TRADING_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Key", self.api_key.clone())
            .header("Sign", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_json(command, response).await
    }

    fn get_signature(&self, body: &str) -> Result<String> {
        let mut hmac: Hmac<Sha512> = Hmac::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::Connectivity(format!("invalid secret key: {e}")))?;
        hmac.update(body.as_bytes());
        Ok(hex::encode(hmac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PoloniexApi for PoloniexRestClient {
    async fn tickers(&self) -> Result<HashMap<String, TickerEntry>> {
        self.get("command=returnTicker").await
    }

    async fn order_book(&self, pair: &str) -> Result<BookSnapshot> {
        self.get(&format!(
            "command=returnOrderBook&currencyPair={pair}&depth={BOOK_DEPTH}"
        ))
        .await
    }

    async fn place_limit_order(&self, pair: &str, order: &PendingLimitOrder) -> Result<String> {
        let command = if order.side.is_buy() { "buy" } else { "sell" };
        let params = format!(
            "currencyPair={pair}&rate={}&amount={}",
            order.price, order.amount
        );

        let placed: PlacedOrder = self.post_trading(command, &params).await?;
        Ok(placed.order_number)
    }
}

#[derive(Deserialize)]
struct PlacedOrder {
    #[serde(rename = "orderNumber")]
    order_number: String,
}

/// Poloniex reports most failures as `{"error": "..."}` with a 200 status.
async fn read_json<T: DeserializeOwned>(request: &str, response: Response) -> Result<T> {
    let status = response.status();
    let content = response
        .text()
        .await
        .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

    trace!("Poloniex: Response to {request}: {status} {content}");

    match status {
        s if s.is_success() => parse_body(request, &content),
        StatusCode::NOT_FOUND => Err(ExchangeError::NotFound(request.to_string())),
        _ => Err(ExchangeError::Connectivity(format!(
            "Poloniex: {request} returned {status}: {content}"
        ))),
    }
}

fn parse_body<T: DeserializeOwned>(request: &str, content: &str) -> Result<T> {
    let value: Value = serde_json::from_str(content).map_err(|e| ExchangeError::data(request, e))?;

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(if error.starts_with("Invalid currency pair") {
            ExchangeError::NotFound(error.to_string())
        } else {
            ExchangeError::Connectivity(format!("Poloniex: {error}"))
        });
    }

    serde_json::from_value(value).map_err(|e| ExchangeError::data(request, e))
}
