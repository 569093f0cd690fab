use crate::api::{BinanceApi, BookTicker, DailyStats, Depth, SymbolInfo};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;
use xb_types::{ExchangeError, PendingLimitOrder, Result};

const BASE_URL: &str = "https://api.binance.com";
const BOOK_DEPTH: u32 = 100;
const INVALID_SYMBOL: i64 = -1121;

pub struct BinanceRestClient {
    api_key: String,
    secret_key: String,
    client: Client,
}

impl BinanceRestClient {
    pub fn new(api_key: String, secret_key: String) -> BinanceRestClient {
        BinanceRestClient {
            api_key,
            secret_key,
            client: Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{BASE_URL}{path}?{query}"))
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_json(path, response).await
    }

    async fn post_signed<T: DeserializeOwned>(&self, path: &str, params: &str) -> Result<T> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let query = format!("{params}&timestamp={timestamp}");
        let signature = self.get_signature(&query)?;

        let response = self
            .client
            .post(format!("{BASE_URL}{path}?{query}&signature={signature}"))
            .header("X-MBX-APIKEY", self.api_key.clone())
            .send()
            .await
            .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

        read_json(path, response).await
    }

    fn get_signature(&self, query: &str) -> Result<String> {
        let mut hmac: Hmac<Sha256> = Hmac::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::Connectivity(format!("invalid secret key: {e}")))?;
        hmac.update(query.as_bytes());
        Ok(hex::encode(hmac.finalize().into_bytes()))
    }
}

#[async_trait]
impl BinanceApi for BinanceRestClient {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>> {
        let info: ExchangeInfo = self.get("/api/v3/exchangeInfo", "").await?;
        Ok(info.symbols)
    }

    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker> {
        self.get("/api/v3/ticker/bookTicker", &format!("symbol={symbol}"))
            .await
    }

    async fn daily_stats(&self, symbol: &str) -> Result<DailyStats> {
        self.get("/api/v3/ticker/24hr", &format!("symbol={symbol}"))
            .await
    }

    async fn depth(&self, symbol: &str) -> Result<Depth> {
        self.get(
            "/api/v3/depth",
            &format!("symbol={symbol}&limit={BOOK_DEPTH}"),
        )
        .await
    }

    async fn place_limit_order(&self, symbol: &str, order: &PendingLimitOrder) -> Result<String> {
        let side = if order.side.is_buy() { "BUY" } else { "SELL" };
        let params = format!(
            "symbol={symbol}&side={side}&type=LIMIT&timeInForce=GTC&quantity={}&price={}",
            order.amount, order.price
        );

        let placed: PlacedOrder = self.post_signed("/api/v3/order", &params).await?;
        Ok(placed.client_order_id)
    }
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    client_order_id: String,
}

/// Binance rejects requests with a non-2xx status and `{"code": -1121, "msg": "..."}`.
#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

async fn read_json<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
    let status = response.status();
    let content = response
        .text()
        .await
        .map_err(|e| ExchangeError::Connectivity(e.to_string()))?;

    trace!("Binance: Response to {path}: {status} {content}");

    if status.is_success() {
        serde_json::from_str(&content).map_err(|e| ExchangeError::data(path, e))
    } else {
        Err(api_error(path, &content))
    }
}

fn api_error(path: &str, content: &str) -> ExchangeError {
    match serde_json::from_str::<ApiError>(content) {
        Ok(error) if error.code == INVALID_SYMBOL => ExchangeError::NotFound(error.msg),
        Ok(error) => ExchangeError::Connectivity(format!("Binance: {} ({})", error.msg, error.code)),
        Err(_) => ExchangeError::Connectivity(format!("Binance: {path} failed: {content}")),
    }
}
