use super::Brokerage;
use crate::error::VenueError;
use crate::models::{AccountSnapshot, Bar, MarketClock, OrderConfirmation, OrderRequest, Resolution};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const LIVE_TRADING_URL: &str = "https://api.alpaca.markets";
pub const MARKET_DATA_URL: &str = "https://data.alpaca.markets";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const BARS_PAGE_LIMIT: u32 = 10_000;

type AlpacaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for the Alpaca REST API
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    pub key_id: String,
    pub secret_key: String,
    pub trading_url: String,
    pub data_url: String,
    pub feed: String,
    pub request_timeout: Duration,
    pub rate_limit_per_minute: u32,
}

impl AlpacaConfig {
    pub fn paper(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            trading_url: PAPER_TRADING_URL.to_string(),
            data_url: MARKET_DATA_URL.to_string(),
            feed: "iex".to_string(),
            request_timeout: Duration::from_secs(10),
            rate_limit_per_minute: 200,
        }
    }
}

/// Client for the Alpaca trading and market-data REST APIs
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    config: AlpacaConfig,
    rate_limiter: Arc<AlpacaRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<Vec<RawBar>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "c")]
    close: f64,
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    is_open: bool,
    next_open: DateTime<Utc>,
    next_close: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    equity: String,
    buying_power: String,
}

impl AccountResponse {
    fn into_snapshot(self) -> Result<AccountSnapshot, VenueError> {
        let equity = self
            .equity
            .parse::<f64>()
            .map_err(|e| VenueError::Decode(format!("equity '{}': {}", self.equity, e)))?;
        let buying_power = self.buying_power.parse::<f64>().map_err(|e| {
            VenueError::Decode(format!("buying_power '{}': {}", self.buying_power, e))
        })?;

        Ok(AccountSnapshot {
            equity,
            buying_power,
        })
    }
}

// ============== Implementation ==============

impl AlpacaClient {
    pub fn new(config: AlpacaConfig) -> Result<Self, VenueError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        let per_minute = NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.config.key_id)
            .header("APCA-API-SECRET-KEY", &self.config.secret_key)
    }

    /// Send once through the rate limiter and map non-2xx statuses
    async fn send(&self, request: RequestBuilder) -> Result<Response, VenueError> {
        self.rate_limiter.until_ready().await;

        let response = self.authorized(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VenueError::RateLimited);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(VenueError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// GET with exponential backoff on rate limits and server errors
    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Response, VenueError> {
        let mut attempt = 1;

        loop {
            let result = self.send(self.client.get(url).query(query)).await;

            let retryable = match &result {
                Err(VenueError::RateLimited) | Err(VenueError::Timeout) => true,
                Err(VenueError::Status { status, .. }) => *status >= 500,
                _ => false,
            };

            if !retryable || attempt >= MAX_RETRIES {
                return result;
            }

            let backoff_ms = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
            if let Err(e) = &result {
                tracing::warn!(
                    "Alpaca GET {} failed: {}, retrying in {}ms (attempt {}/{})",
                    url,
                    e,
                    backoff_ms,
                    attempt,
                    MAX_RETRIES
                );
            }
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            attempt += 1;
        }
    }

    /// Get historical bars, following pagination
    /// Endpoint: GET /v2/stocks/{symbol}/bars
    pub async fn get_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, VenueError> {
        let url = format!("{}/v2/stocks/{}/bars", self.config.data_url, symbol);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeframe", resolution.as_timeframe().to_string()),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("limit", BARS_PAGE_LIMIT.to_string()),
                ("feed", self.config.feed.clone()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: BarsResponse = self.get_with_retry(&url, &query).await?.json().await?;

            bars.extend(
                page.bars
                    .unwrap_or_default()
                    .into_iter()
                    .map(|raw| Bar::new(symbol, raw.close, raw.timestamp)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(symbol = %symbol, count = bars.len(), "Fetched historical bars");
        Ok(bars)
    }

    /// Submit an order; never retried here
    /// Endpoint: POST /v2/orders
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, VenueError> {
        let url = format!("{}/v2/orders", self.config.trading_url);
        let confirmation: OrderConfirmation =
            self.send(self.client.post(&url).json(order)).await?.json().await?;

        tracing::debug!(
            symbol = %confirmation.symbol,
            order_id = %confirmation.id,
            status = %confirmation.status,
            "Order accepted"
        );
        Ok(confirmation)
    }

    /// Endpoint: GET /v2/clock
    pub async fn get_clock(&self) -> Result<MarketClock, VenueError> {
        let url = format!("{}/v2/clock", self.config.trading_url);
        let clock: ClockResponse = self.get_with_retry(&url, &[]).await?.json().await?;

        Ok(MarketClock {
            is_open: clock.is_open,
            next_open: clock.next_open,
            next_close: clock.next_close,
        })
    }

    /// Endpoint: GET /v2/account
    pub async fn get_account(&self) -> Result<AccountSnapshot, VenueError> {
        let url = format!("{}/v2/account", self.config.trading_url);
        let account: AccountResponse = self.get_with_retry(&url, &[]).await?.json().await?;
        account.into_snapshot()
    }
}

#[async_trait]
impl Brokerage for AlpacaClient {
    async fn historical_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, VenueError> {
        self.get_bars(symbol, resolution, start, end).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, VenueError> {
        self.submit_order(order).await
    }

    async fn market_clock(&self) -> Result<MarketClock, VenueError> {
        self.get_clock().await
    }

    async fn account(&self) -> Result<AccountSnapshot, VenueError> {
        self.get_account().await
    }
}
