use super::{Exchange, ExchangeError};
use crate::models::{Balance, MarketSnapshot, OrderStatus, Side, SymbolRules};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

// Binance Spot REST API v3
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
const BINANCE_API_BASE: &str = "https://api.binance.com";
const BINANCE_TESTNET_BASE: &str = "https://testnet.binance.vision";
const RATE_LIMIT_RPS: u32 = 10;
const RECV_WINDOW_MS: u64 = 5000;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Signed REST client for Binance spot.
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: String,
    bid_qty: String,
    ask_price: String,
    ask_qty: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER")]
    Price {
        #[serde(rename = "tickSize")]
        tick_size: String,
    },
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "minQty")]
        min_qty: String,
        #[serde(rename = "stepSize")]
        step_size: String,
    },
    #[serde(rename = "MIN_NOTIONAL", alias = "NOTIONAL")]
    MinNotional {
        #[serde(rename = "minNotional")]
        min_notional: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Account {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    /// Client for production, or the public spot testnet when `sandbox` is set
    pub fn new(api_key: String, api_secret: String, sandbox: bool) -> anyhow::Result<Self> {
        let base_url = if sandbox {
            BINANCE_TESTNET_BASE
        } else {
            BINANCE_API_BASE
        };
        Self::with_base_url(base_url, api_key, api_secret)
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: String,
        api_secret: String,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let per_second = NonZeroU32::new(RATE_LIMIT_RPS).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            rate_limiter,
        })
    }

    /// `ETH/USDT` -> `ETHUSDT`
    fn market_symbol(symbol: &str) -> String {
        symbol.replace('/', "").to_ascii_uppercase()
    }

    /// HMAC-SHA256 of the query string, hex encoded
    fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Auth(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Unsigned GET with retry on transient failures (reads are idempotent)
    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}?{}", self.base_url, path, encode_query(params));
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            let result = match self.client.get(&url).send().await {
                Ok(response) => handle_response(response).await,
                Err(e) => Err(ExchangeError::from(e)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}ms...",
                        attempt,
                        MAX_RETRIES,
                        path,
                        e,
                        backoff_ms
                    );
                    last_error = Some(e);
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
                other => return other,
            }
        }

        Err(last_error.unwrap_or_else(|| ExchangeError::Network("retries exhausted".to_string())))
    }

    /// Signed request; never retried so an order cannot be sent twice
    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, ExchangeError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ExchangeError::Auth(
                "API key and secret are required for account endpoints".to_string(),
            ));
        }

        params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = encode_query(&params);
        let signature = self.sign(&query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        handle_response(response).await
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ExchangeError> {
    let status = response.status();

    if status.is_success() {
        return response.json::<T>().await.map_err(ExchangeError::from);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status, &body))
}

fn classify_error(status: StatusCode, body: &str) -> ExchangeError {
    let api_error = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = api_error
        .as_ref()
        .map(|e| format!("{} (code {})", e.msg, e.code))
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return ExchangeError::RateLimited(message);
    }
    if status.is_server_error() {
        return ExchangeError::Network(message);
    }

    match api_error {
        Some(ApiErrorBody { code: -2011, .. }) | Some(ApiErrorBody { code: -2013, .. }) => {
            ExchangeError::OrderNotFound(message)
        }
        Some(ApiErrorBody { code: -2010, ref msg })
            if msg.to_ascii_lowercase().contains("insufficient balance") =>
        {
            ExchangeError::InsufficientBalance(message)
        }
        Some(ApiErrorBody { code: -2014, .. }) | Some(ApiErrorBody { code: -2015, .. }) => {
            ExchangeError::Auth(message)
        }
        _ if status == StatusCode::UNAUTHORIZED => ExchangeError::Auth(message),
        _ => ExchangeError::Rejected(message),
    }
}

fn parse_number(value: &str, field: &str) -> Result<f64, ExchangeError> {
    value
        .parse::<f64>()
        .map_err(|_| ExchangeError::InvalidResponse(format!("{} is not a number: '{}'", field, value)))
}

/// Fixed-point rendering without trailing zeros, as the API expects
fn format_decimal(value: f64) -> String {
    let text = format!("{:.8}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn parse_status(status: &str) -> OrderStatus {
    match status {
        "NEW" | "PENDING_NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "PENDING_CANCEL" | "EXPIRED" | "EXPIRED_IN_MATCH" | "REJECTED" => {
            OrderStatus::Cancelled
        }
        _ => OrderStatus::Unknown,
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ExchangeError> {
        let params = [("symbol", Self::market_symbol(symbol))];

        let (book, last): (BookTicker, TickerPrice) = tokio::try_join!(
            self.public_get("/api/v3/ticker/bookTicker", &params),
            self.public_get("/api/v3/ticker/price", &params),
        )?;

        Ok(MarketSnapshot {
            bid: parse_number(&book.bid_price, "bidPrice")?,
            ask: parse_number(&book.ask_price, "askPrice")?,
            bid_qty: parse_number(&book.bid_qty, "bidQty")?,
            ask_qty: parse_number(&book.ask_qty, "askQty")?,
            last_price: parse_number(&last.price, "price")?,
            timestamp: Utc::now(),
        })
    }

    async fn balance(&self, symbol: &str) -> Result<Balance, ExchangeError> {
        let (base_asset, quote_asset) = symbol
            .split_once('/')
            .ok_or_else(|| ExchangeError::Rejected(format!("malformed symbol '{}'", symbol)))?;

        let account: Account = self.signed(Method::GET, "/api/v3/account", Vec::new()).await?;

        let mut balance = Balance::default();
        for entry in &account.balances {
            if entry.asset.eq_ignore_ascii_case(base_asset) {
                balance.base = parse_number(&entry.free, "free")?;
            } else if entry.asset.eq_ignore_ascii_case(quote_asset) {
                balance.quote = parse_number(&entry.free, "free")?;
            }
        }

        Ok(balance)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        let market = Self::market_symbol(symbol);
        let info: ExchangeInfo = self
            .public_get("/api/v3/exchangeInfo", &[("symbol", market.clone())])
            .await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == market)
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("{} not listed", market)))?;

        let mut rules = SymbolRules::default();
        for filter in &symbol_info.filters {
            match filter {
                SymbolFilter::Price { tick_size } => {
                    rules.tick_size = parse_number(tick_size, "tickSize")?;
                }
                SymbolFilter::LotSize { min_qty, step_size } => {
                    rules.min_qty = parse_number(min_qty, "minQty")?;
                    rules.qty_step = parse_number(step_size, "stepSize")?;
                }
                SymbolFilter::MinNotional { min_notional } => {
                    rules.min_notional = parse_number(min_notional, "minNotional")?;
                }
                SymbolFilter::Other => {}
            }
        }

        Ok(rules)
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<String, ExchangeError> {
        let params = vec![
            ("symbol", Self::market_symbol(symbol)),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format_decimal(quantity)),
            ("price", format_decimal(price)),
        ];

        let ack: OrderAck = self.signed(Method::POST, "/api/v3/order", params).await?;
        Ok(ack.order_id.to_string())
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let params = vec![
            ("symbol", Self::market_symbol(symbol)),
            ("orderId", order_id.to_string()),
        ];

        let _: serde_json::Value = self.signed(Method::DELETE, "/api/v3/order", params).await?;
        Ok(())
    }

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<String>, ExchangeError> {
        let params = vec![("symbol", Self::market_symbol(symbol))];
        let orders: Vec<OrderAck> = self.signed(Method::GET, "/api/v3/openOrders", params).await?;
        Ok(orders.into_iter().map(|o| o.order_id.to_string()).collect())
    }

    async fn order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = vec![
            ("symbol", Self::market_symbol(symbol)),
            ("orderId", order_id.to_string()),
        ];
        let info: OrderInfo = self.signed(Method::GET, "/api/v3/order", params).await?;
        Ok(parse_status(&info.status))
    }
}
