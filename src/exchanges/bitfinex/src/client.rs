use crate::api::{signed_amount, BitfinexApi, BookEntry};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::Sha384;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;
use xb_types::{ExchangeError, PendingLimitOrder, Result};

const PUBLIC_URL: &str = "https://api-pub.bitfinex.com";
const AUTHENTICATED_URL: &str = "https://api.bitfinex.com";
const BOOK_LENGTH: u32 = 100;

pub struct BitfinexRestClient {
    api_key: String,
    secret_key: String,
    client: Client,
}

impl BitfinexRestClient {
    pub fn new(api_key: String, secret_key: String) -> BitfinexRestClient {
        BitfinexRestClient {
            api_key,
            secret_key,
            client: Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{PUBLIC_URL}/{path}"))
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_json(path, response).await
    }

    async fn post_authenticated<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let body = body.to_string();
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros()
            .to_string();
        let signature = self.get_signature(&format!("/api/{path}{nonce}{body}"))?;

        let response = self
            .client
            .post(format!("{AUTHENTICATED_URL}/{path}"))
            .header("Content-Type", "application/json")
            .header("bfx-nonce", nonce)
            .header("bfx-apikey", self.api_key.clone())
            .header("bfx-signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_json(path, response).await
    }

    fn get_signature(&self, payload: &str) -> Result<String> {
        trace!("Bitfinex: Signing: {payload}");
        let mut hmac: Hmac<Sha384> = Hmac::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::Connectivity(format!("invalid secret key: {e}")))?;
        hmac.update(payload.as_bytes());
        Ok(hex::encode(hmac.finalize().into_bytes()))
    }
}

#[async_trait]
impl BitfinexApi for BitfinexRestClient {
    async fn exchange_pairs(&self) -> Result<Vec<String>> {
        let lists: Vec<Vec<String>> = self.get("v2/conf/pub:list:pair:exchange").await?;
        lists
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::NotFound("pub:list:pair:exchange".to_string()))
    }

    async fn ticker(&self, symbol: &str) -> Result<Vec<f64>> {
        let values: Vec<f64> = self.get(&format!("v2/ticker/{symbol}")).await?;
        if values.is_empty() {
            return Err(ExchangeError::NotFound(symbol.to_string()));
        }
        Ok(values)
    }

    async fn book(&self, symbol: &str) -> Result<Vec<BookEntry>> {
        self.get(&format!("v2/book/{symbol}/P0?len={BOOK_LENGTH}"))
            .await
    }

    async fn submit_limit_order(&self, symbol: &str, order: &PendingLimitOrder) -> Result<u64> {
        let body = json!({
            "type": "EXCHANGE LIMIT",
            "symbol": symbol,
            "amount": signed_amount(order),
            "price": order.price.to_string(),
        });

        let notification: Value = self.post_authenticated("v2/auth/w/order/submit", &body).await?;
        order_id_from_notification(&notification)
    }
}

async fn read_json<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
    let status = response.status();
    let content = response
        .text()
        .await
        .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

    trace!("Bitfinex: Response from {path}: {status} {content}");

    match status {
        s if s.is_success() => {
            serde_json::from_str(&content).map_err(|e| ExchangeError::data(path, e))
        }
        StatusCode::NOT_FOUND => Err(ExchangeError::NotFound(path.to_string())),
        _ => Err(ExchangeError::Connectivity(format!(
            "Bitfinex: {path} returned {status}: {content}"
        ))),
    }
}

// [MTS, TYPE, MESSAGE_ID, null, [[ID, GID, CID, SYMBOL, ...]], CODE, STATUS, TEXT]
fn order_id_from_notification(notification: &Value) -> Result<u64> {
    if notification[6].as_str() != Some("SUCCESS") {
        let text = notification[7].as_str().unwrap_or("order rejected");
        return Err(ExchangeError::Connectivity(format!("Bitfinex: {text}")));
    }

    notification[4][0][0]
        .as_u64()
        .ok_or_else(|| ExchangeError::data("order id", &notification[4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_is_read_from_success_notification() {
        let notification = json!([
            1567590617442u64,
            "on-req",
            null,
            null,
            [[30630788061u64, null, 1567590617439u64, "tBTCUSD", 1567590617439u64]],
            null,
            "SUCCESS",
            "Submitting 1 orders."
        ]);

        assert_eq!(order_id_from_notification(&notification).unwrap(), 30630788061);
    }

    #[test]
    fn rejected_notification_is_an_error() {
        let notification = json!([
            1567590617442u64,
            "on-req",
            null,
            null,
            [],
            null,
            "ERROR",
            "Invalid order: not enough exchange balance"
        ]);

        assert!(matches!(
            order_id_from_notification(&notification),
            Err(ExchangeError::Connectivity(text)) if text.contains("not enough")
        ));
    }

    #[test]
    fn signature_is_hex_encoded_sha384() {
        let client = BitfinexRestClient::new("key".to_string(), "secret".to_string());
        let signature = client.get_signature("/api/v2/auth/w/order/submit1{}").unwrap();
        assert_eq!(signature.len(), 96);
    }
}
