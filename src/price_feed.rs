// 13.0 price_feed.rs: where raw prices come from. the engine only needs a decimal
// string per asset; the market class picks the upstream provider.
// 13.1 fetch_with_retry bounds every call with a timeout and retries transient errors.

use crate::asset::Asset;
use crate::config::{FeedConfig, SettingsProvider};
use crate::types::MarketClass;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Bad response: {0}")]
    BadResponse(String),

    #[error("Missing API key for {0}")]
    MissingKey(String),

    #[error("No provider for {0}")]
    Unsupported(String),
}

impl FeedError {
    /// Transport failures are worth another attempt, a malformed answer is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Http(_) | FeedError::Timeout(_))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FeedError::BadResponse(e.to_string())
        } else {
            FeedError::Http(e.to_string())
        }
    }
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Latest raw price for the asset, as the provider formats it.
    async fn fetch_price(&self, asset: &Asset) -> Result<String, FeedError>;

    fn name(&self) -> &str;
}

/// Upstream market data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Cryptonator,
    IexQuote,
    IexTimeSeries,
    Fcs,
}

impl Provider {
    pub fn for_market(market: MarketClass) -> Self {
        match market {
            MarketClass::Crypto => Provider::Cryptonator,
            MarketClass::Stock => Provider::IexQuote,
            MarketClass::Commodity => Provider::IexTimeSeries,
            MarketClass::Forex | MarketClass::Index => Provider::Fcs,
        }
    }
}

/// HTTP feed. Picks a provider per market class; API keys are read from the
/// current settings on every request.
pub struct HttpPriceFeed {
    config: FeedConfig,
    settings: Arc<dyn SettingsProvider>,
    client: reqwest::Client,
}

impl HttpPriceFeed {
    pub fn new(config: FeedConfig, settings: Arc<dyn SettingsProvider>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            config,
            settings,
            client,
        })
    }

    fn url(&self, provider: Provider, asset: &Asset) -> Result<String, FeedError> {
        let keys = self
            .settings
            .settings()
            .map_err(|e| FeedError::MissingKey(e.to_string()))?
            .api_keys;
        let ticker = asset.ticker.to_lowercase();

        match provider {
            Provider::Cryptonator => Ok(format!(
                "{}/api/ticker/{}-usd",
                self.config.cryptonator_url, ticker
            )),
            Provider::IexQuote => Ok(format!(
                "{}/stock/{}/quote?token={}",
                self.config.iex_url,
                ticker,
                required_key(&keys.iex, "iex")?
            )),
            Provider::IexTimeSeries => Ok(format!(
                "{}/time-series/energy/{}?token={}",
                self.config.iex_url,
                ticker,
                required_key(&keys.iex, "iex")?
            )),
            Provider::Fcs => {
                let id = fcs_id(asset)?;
                let path = match asset.market {
                    MarketClass::Index => "stock/indices_latest",
                    _ => "forex/latest",
                };
                Ok(format!(
                    "{}/{}?id={}&access_key={}",
                    self.config.fcs_url,
                    path,
                    id,
                    required_key(&keys.fcs, "fcs")?
                ))
            }
        }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch_price(&self, asset: &Asset) -> Result<String, FeedError> {
        let provider = Provider::for_market(asset.market);
        let url = self.url(provider, asset)?;

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http(format!("{} returned {}", asset.ticker, status)));
        }
        let body = response.json::<Value>().await?;

        match provider {
            Provider::Cryptonator => parse_cryptonator(&body),
            Provider::IexQuote => parse_iex_quote(&body),
            Provider::IexTimeSeries => parse_iex_series(&body),
            Provider::Fcs => parse_fcs(&body, fcs_id(asset)?),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn required_key<'a>(key: &'a str, provider: &str) -> Result<&'a str, FeedError> {
    if key.is_empty() {
        Err(FeedError::MissingKey(provider.to_string()))
    } else {
        Ok(key)
    }
}

fn fcs_id(asset: &Asset) -> Result<&str, FeedError> {
    asset
        .provider_id
        .as_deref()
        .ok_or_else(|| FeedError::Unsupported(format!("{} has no provider id", asset.ticker)))
}

// providers send prices as strings or as json numbers
fn price_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_cryptonator(body: &Value) -> Result<String, FeedError> {
    if body["success"] == Value::Bool(false) {
        let reason = body["error"].as_str().unwrap_or("unsuccessful");
        return Err(FeedError::BadResponse(reason.to_string()));
    }
    price_text(&body["ticker"]["price"])
        .ok_or_else(|| FeedError::BadResponse("missing ticker.price".to_string()))
}

pub fn parse_iex_quote(body: &Value) -> Result<String, FeedError> {
    price_text(&body["latestPrice"])
        .ok_or_else(|| FeedError::BadResponse("missing latestPrice".to_string()))
}

/// Time series come oldest first; the last point is the latest.
pub fn parse_iex_series(body: &Value) -> Result<String, FeedError> {
    body.as_array()
        .and_then(|points| points.last())
        .and_then(|point| price_text(&point["value"]))
        .ok_or_else(|| FeedError::BadResponse("empty time series".to_string()))
}

pub fn parse_fcs(body: &Value, id: &str) -> Result<String, FeedError> {
    if body["status"] == Value::Bool(false) {
        let reason = body["msg"].as_str().unwrap_or("unsuccessful");
        return Err(FeedError::BadResponse(reason.to_string()));
    }
    body["response"]
        .as_array()
        .and_then(|rows| rows.iter().find(|row| price_text(&row["id"]).as_deref() == Some(id)))
        .and_then(|row| price_text(&row["price"]))
        .ok_or_else(|| FeedError::BadResponse(format!("no price for id {id}")))
}

// Retry wrapper: each attempt gets the request timeout, retryable failures sleep
// the backoff and go again, anything else returns straight away.
pub async fn fetch_with_retry(
    feed: &dyn PriceFeed,
    asset: &Asset,
    config: &FeedConfig,
) -> Result<String, FeedError> {
    let attempts = config.retry_attempts.max(1);
    let mut last_error = FeedError::Http("no attempt made".to_string());

    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(config.request_timeout(), feed.fetch_price(asset)).await;
        match outcome {
            Ok(Ok(price)) => {
                debug!(ticker = %asset.ticker, feed = feed.name(), attempt, "price fetched");
                return Ok(price);
            }
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => last_error = e,
            Err(_) => last_error = FeedError::Timeout(config.request_timeout()),
        }

        if attempt < attempts {
            warn!(
                ticker = %asset.ticker,
                attempt,
                attempts,
                error = %last_error,
                "price fetch failed, retrying in {:?}",
                config.retry_backoff()
            );
            tokio::time::sleep(config.retry_backoff()).await;
        }
    }

    Err(last_error)
}

/// Fixed prices keyed by ticker. Can be told to fail or stall.
#[derive(Debug, Default)]
pub struct StaticFeed {
    prices: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
    delay: Option<Duration>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_price(&self, ticker: &str, price: impl Into<String>) {
        self.prices.lock().insert(ticker.to_string(), price.into());
    }

    /// The next `times` fetches for the ticker fail with a transport error.
    pub fn fail_next(&self, ticker: &str, times: u32) {
        self.failures.lock().insert(ticker.to_string(), times);
    }

    pub fn calls(&self, ticker: &str) -> u32 {
        self.calls.lock().get(ticker).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PriceFeed for StaticFeed {
    async fn fetch_price(&self, asset: &Asset) -> Result<String, FeedError> {
        *self.calls.lock().entry(asset.ticker.clone()).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&asset.ticker) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FeedError::Http(format!("{} unavailable", asset.ticker)));
                }
            }
        }

        self.prices
            .lock()
            .get(&asset.ticker)
            .cloned()
            .ok_or_else(|| FeedError::Unsupported(asset.ticker.clone()))
    }

    fn name(&self) -> &str {
        "static"
    }
}
