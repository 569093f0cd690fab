use crate::api::{AssetPair, Depth, KrakenApi, TickerInfo};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;
use xb_types::{ExchangeError, PendingLimitOrder, Result};

const BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenRestClient {
    api_key: String,
    secret_key: String,
    client: Client,
}

impl KrakenRestClient {
    pub fn new(api_key: String, secret_key: String) -> KrakenRestClient {
        KrakenRestClient {
            api_key,
            secret_key,
            client: Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{BASE_URL}/0/public/{method}?{query}"))
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_result(method, response).await
    }

    async fn post_private<T: DeserializeOwned>(&self, method: &str, params: &str) -> Result<T> {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .to_string();
        let path = format!("/0/private/{method}");
        let body = format!("nonce={nonce}&{params}");
        let signature = self.get_signature(&path, &nonce, &body)?;

        let response = self
            .client
            .post(format!("{BASE_URL}{path}"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("API-Key", self.api_key.clone())
            .header("API-Sign", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_result(method, response).await
    }

    // base64(HMAC-SHA512(base64-decoded secret, path + SHA256(nonce + body)))
    fn get_signature(&self, path: &str, nonce: &str, body: &str) -> Result<String> {
        let secret = STANDARD
            .decode(&self.secret_key)
            .map_err(|e| ExchangeError::Connectivity(format!("invalid secret key: {e}")))?;

        let digest = Sha256::digest(format!("{nonce}{body}").as_bytes());
        let mut hmac: Hmac<Sha512> = Hmac::new_from_slice(&secret)
            .map_err(|e| ExchangeError::Connectivity(format!("invalid secret key: {e}")))?;
        hmac.update(path.as_bytes());
        hmac.update(&digest);
        Ok(STANDARD.encode(hmac.finalize().into_bytes()))
    }
}

#[async_trait]
impl KrakenApi for KrakenRestClient {
    async fn asset_pairs(&self) -> Result<HashMap<String, AssetPair>> {
        self.get("AssetPairs", "").await
    }

    async fn ticker(&self, pair: &str) -> Result<TickerInfo> {
        let tickers: HashMap<String, TickerInfo> = self.get("Ticker", &format!("pair={pair}")).await?;
        single_entry(pair, tickers)
    }

    async fn depth(&self, pair: &str) -> Result<Depth> {
        let depths: HashMap<String, Depth> = self.get("Depth", &format!("pair={pair}")).await?;
        single_entry(pair, depths)
    }

    async fn add_order(&self, pair: &str, order: &PendingLimitOrder) -> Result<Vec<String>> {
        let side = if order.side.is_buy() { "buy" } else { "sell" };
        let params = format!(
            "ordertype=limit&type={side}&volume={}&pair={pair}&price={}",
            order.amount, order.price
        );

        let placed: AddOrderResult = self.post_private("AddOrder", &params).await?;
        Ok(placed.txid)
    }
}

#[derive(Deserialize)]
struct AddOrderResult {
    txid: Vec<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

async fn read_result<T: DeserializeOwned>(method: &str, response: Response) -> Result<T> {
    let status = response.status();
    let content = response
        .text()
        .await
        .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

    trace!("Kraken: Response to {method}: {status} {content}");

    if !status.is_success() {
        return Err(ExchangeError::Connectivity(format!(
            "Kraken: {method} returned {status}: {content}"
        )));
    }
    parse_envelope(method, &content)
}

/// Kraken wraps every response in `{"error": [...], "result": {...}}` and reports failures in
/// `error` with a 200 status.
fn parse_envelope<T: DeserializeOwned>(method: &str, content: &str) -> Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(content).map_err(|e| ExchangeError::data(method, e))?;

    if let Some(error) = envelope.error.first() {
        return Err(if error.starts_with("EQuery:Unknown asset pair") {
            ExchangeError::NotFound(error.clone())
        } else {
            ExchangeError::Connectivity(format!("Kraken: {}", envelope.error.join(", ")))
        });
    }

    envelope
        .result
        .ok_or_else(|| ExchangeError::NotFound(method.to_string()))
}

/// Results keyed by pair may use Kraken's own pair name rather than the one requested.
fn single_entry<T>(pair: &str, mut entries: HashMap<String, T>) -> Result<T> {
    if let Some(entry) = entries.remove(pair) {
        return Ok(entry);
    }
    match entries.len() {
        1 => entries
            .into_values()
            .next()
            .ok_or_else(|| ExchangeError::NotFound(pair.to_string())),
        _ => Err(ExchangeError::NotFound(pair.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_is_unwrapped_from_the_envelope() {
        let placed: AddOrderResult = parse_envelope(
            "AddOrder",
            r#"{"error":[],"result":{"descr":{"order":"buy 1.25 XBTUSD @ limit 30000.0"},"txid":["OUF4EM-FRGI2-MQMWZD"]}}"#,
        )
        .unwrap();

        assert_eq!(placed.txid, ["OUF4EM-FRGI2-MQMWZD"]);
    }

    #[test]
    fn unknown_pair_is_not_found() {
        let result: Result<HashMap<String, TickerInfo>> =
            parse_envelope("Ticker", r#"{"error":["EQuery:Unknown asset pair"]}"#);

        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn other_errors_are_connectivity_failures() {
        let result: Result<AddOrderResult> =
            parse_envelope("AddOrder", r#"{"error":["EAPI:Invalid key"]}"#);

        assert_eq!(
            result.err(),
            Some(ExchangeError::Connectivity("Kraken: EAPI:Invalid key".to_string()))
        );
    }

    #[test]
    fn entry_keyed_by_canonical_pair_name_is_found() {
        let entries = HashMap::from([("XXBTZUSD".to_string(), 1)]);

        assert_eq!(single_entry("XBTUSD", entries).unwrap(), 1);
        assert!(single_entry("XBTUSD", HashMap::<String, u8>::new()).is_err());
    }

    #[test]
    fn signature_is_base64_encoded_sha512() {
        let client = KrakenRestClient::new("key".to_string(), STANDARD.encode("secret"));

        let signature = client
            .get_signature("/0/private/AddOrder", "1", "nonce=1&ordertype=limit")
            .unwrap();

        assert_eq!(STANDARD.decode(signature).unwrap().len(), 64);
    }

    #[test]
    fn secret_must_be_base64() {
        let client = KrakenRestClient::new("key".to_string(), "not base64!".to_string());

        let result = client.get_signature("/0/private/AddOrder", "1", "nonce=1");

        assert!(matches!(result, Err(ExchangeError::Connectivity(_))));
    }
}
