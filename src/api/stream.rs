//! Alpaca websocket streams.
//!
//! `LiveBarStream` pushes minute bars for the tracked symbols into a channel,
//! `TradeUpdateStream` logs account order events. Both reconnect with
//! exponential backoff; neither replays anything missed while disconnected.

use crate::error::VenueError;
use crate::models::{Bar, Resolution};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub const IEX_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/iex";
pub const PAPER_TRADE_STREAM_URL: &str = "wss://paper-api.alpaca.markets/stream";
pub const LIVE_TRADE_STREAM_URL: &str = "wss://api.alpaca.markets/stream";

/// Stream connection settings
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub key_id: String,
    pub secret_key: String,
    /// Maximum reconnection attempts (0 = infinite)
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl StreamConfig {
    pub fn new(
        url: impl Into<String>,
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
        }
    }

    /// Exponential backoff capped at the max delay, plus up to 1s jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.reconnect_max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..1000);
        Duration::from_millis(delay + jitter)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_reconnect_attempts > 0 && attempt >= self.max_reconnect_attempts
    }
}

/// How a stream session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Server closed the socket; reconnect
    Disconnected,
    /// Our consumer went away; stop for good
    ConsumerGone,
}

// ============== Market data stream ==============

/// One element of a market-data frame (frames are JSON arrays)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "T")]
pub enum DataMessage {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error { code: i64, msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },
    #[serde(rename = "b")]
    Bar {
        #[serde(rename = "S")]
        symbol: String,
        #[serde(rename = "c")]
        close: f64,
        #[serde(rename = "t")]
        timestamp: DateTime<Utc>,
    },
    #[serde(other)]
    Other,
}

pub fn parse_data_frame(text: &str) -> Result<Vec<DataMessage>, VenueError> {
    Ok(serde_json::from_str(text)?)
}

/// Push-based live bar subscription for a fixed symbol set
pub struct LiveBarStream {
    config: StreamConfig,
    symbols: Vec<String>,
}

impl LiveBarStream {
    /// The `bars` channel only carries one-minute bars
    pub const RESOLUTION: Resolution = Resolution::Minute;

    pub fn new(config: StreamConfig, symbols: Vec<String>) -> Self {
        let symbols = symbols.into_iter().map(|s| s.to_uppercase()).collect();
        Self { config, symbols }
    }

    /// Run until the receiving side is dropped or reconnects are exhausted
    pub async fn run(&self, bars: mpsc::Sender<Bar>) -> Result<(), VenueError> {
        let mut attempt = 0u32;

        loop {
            match self.session(&bars).await {
                Ok(SessionEnd::ConsumerGone) => {
                    info!("Bar consumer dropped, stopping live bar stream");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => {
                    warn!("Live bar stream disconnected");
                    attempt = 0;
                }
                Err(e) => {
                    error!(error = %e, "Live bar stream error");
                }
            }

            attempt += 1;
            if self.config.exhausted(attempt) {
                return Err(VenueError::Stream(format!(
                    "live bar stream gave up after {} attempts",
                    attempt
                )));
            }

            let delay = self.config.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting live bar stream");
            tokio::time::sleep(delay).await;
        }
    }

    async fn session(&self, bars: &mpsc::Sender<Bar>) -> Result<SessionEnd, VenueError> {
        info!(url = %self.config.url, symbols = self.symbols.len(), "Connecting live bar stream");

        let (ws_stream, _response) = connect_async(self.config.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let auth = json!({
            "action": "auth",
            "key": self.config.key_id,
            "secret": self.config.secret_key,
        });
        write.send(Message::Text(auth.to_string())).await?;

        while let Some(frame) = read.next().await {
            let text = match frame? {
                Message::Text(text) => text,
                Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                Message::Close(frame) => {
                    debug!(?frame, "Live bar stream closed by server");
                    return Ok(SessionEnd::Disconnected);
                }
                _ => continue,
            };

            let messages = match parse_data_frame(&text) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed market data frame");
                    continue;
                }
            };

            for message in messages {
                match message {
                    DataMessage::Success { msg } if msg == "authenticated" => {
                        info!("Live bar stream authenticated");
                        let subscribe = json!({ "action": "subscribe", "bars": self.symbols });
                        write.send(Message::Text(subscribe.to_string())).await?;
                    }
                    DataMessage::Success { msg } => debug!(%msg, "Stream status"),
                    DataMessage::Error { code, msg } => {
                        return Err(VenueError::Stream(format!("{} ({})", msg, code)));
                    }
                    DataMessage::Subscription { bars } => {
                        info!(?bars, "Subscribed to live bars");
                    }
                    DataMessage::Bar {
                        symbol,
                        close,
                        timestamp,
                    } => {
                        if bars.send(Bar::new(symbol, close, timestamp)).await.is_err() {
                            return Ok(SessionEnd::ConsumerGone);
                        }
                    }
                    DataMessage::Other => {}
                }
            }
        }

        Ok(SessionEnd::Disconnected)
    }
}

// ============== Trade update stream ==============

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TradeUpdateOrder {
    pub symbol: String,
    #[serde(default)]
    pub side: Option<String>,
}

/// Order lifecycle event from the account stream (`fill`, `new`, ...)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TradeUpdate {
    pub event: String,
    pub order: TradeUpdateOrder,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub position_qty: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradingEvent {
    Authorized,
    Unauthorized(String),
    Listening(Vec<String>),
    TradeUpdate(TradeUpdate),
    Other(String),
}

#[derive(Debug, Deserialize)]
struct TradingFrame {
    stream: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub fn parse_trading_frame(text: &str) -> Result<TradingEvent, VenueError> {
    let frame: TradingFrame = serde_json::from_str(text)?;

    let event = match frame.stream.as_str() {
        "authorization" => {
            let status = frame.data["status"].as_str().unwrap_or_default();
            if status == "authorized" {
                TradingEvent::Authorized
            } else {
                TradingEvent::Unauthorized(status.to_string())
            }
        }
        "listening" => {
            let streams = serde_json::from_value(frame.data["streams"].clone()).unwrap_or_default();
            TradingEvent::Listening(streams)
        }
        "trade_updates" => TradingEvent::TradeUpdate(serde_json::from_value(frame.data)?),
        other => TradingEvent::Other(other.to_string()),
    };

    Ok(event)
}

/// Logging-only consumer of account trade updates
pub struct TradeUpdateStream {
    config: StreamConfig,
}

impl TradeUpdateStream {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<(), VenueError> {
        let mut attempt = 0u32;

        loop {
            match self.session().await {
                Ok(_) => {
                    warn!("Trade update stream disconnected");
                    attempt = 0;
                }
                Err(e) => {
                    error!(error = %e, "Trade update stream error");
                }
            }

            attempt += 1;
            if self.config.exhausted(attempt) {
                return Err(VenueError::Stream(format!(
                    "trade update stream gave up after {} attempts",
                    attempt
                )));
            }

            let delay = self.config.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting trade update stream");
            tokio::time::sleep(delay).await;
        }
    }

    async fn session(&self) -> Result<SessionEnd, VenueError> {
        info!(url = %self.config.url, "Connecting trade update stream");

        let (ws_stream, _response) = connect_async(self.config.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let auth = json!({
            "action": "auth",
            "key": self.config.key_id,
            "secret": self.config.secret_key,
        });
        write.send(Message::Text(auth.to_string())).await?;

        while let Some(frame) = read.next().await {
            let text = match frame? {
                Message::Text(text) => text,
                Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                Message::Close(_) => return Ok(SessionEnd::Disconnected),
                _ => continue,
            };

            match parse_trading_frame(&text) {
                Ok(TradingEvent::Authorized) => {
                    let listen = json!({
                        "action": "listen",
                        "data": { "streams": ["trade_updates"] },
                    });
                    write.send(Message::Text(listen.to_string())).await?;
                }
                Ok(TradingEvent::Unauthorized(status)) => {
                    return Err(VenueError::Stream(format!("authorization {}", status)));
                }
                Ok(TradingEvent::Listening(streams)) => {
                    info!(?streams, "Listening for trade updates");
                }
                Ok(TradingEvent::TradeUpdate(update)) => log_trade_update(&update),
                Ok(TradingEvent::Other(stream)) => debug!(%stream, "Ignoring trading stream frame"),
                Err(e) => warn!(error = %e, "Skipping malformed trading frame"),
            }
        }

        Ok(SessionEnd::Disconnected)
    }
}

fn log_trade_update(update: &TradeUpdate) {
    info!(
        "[{}] {} {} {} @ {}",
        update
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
        update.event,
        update.position_qty.as_deref().unwrap_or("-"),
        update.order.symbol,
        update.price.as_deref().unwrap_or("-"),
    );
}
