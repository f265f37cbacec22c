use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Bar granularity used for both moving-average windows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub enum Resolution {
    #[serde(rename = "1Sec")]
    Second,
    #[serde(rename = "1Min")]
    Minute,
    #[serde(rename = "1Hour")]
    Hour,
    #[serde(rename = "1Day")]
    Day,
}

impl Resolution {
    /// Venue timeframe string (`1Min`, `1Day`, ...)
    pub fn as_timeframe(&self) -> &'static str {
        match self {
            Resolution::Second => "1Sec",
            Resolution::Minute => "1Min",
            Resolution::Hour => "1Hour",
            Resolution::Day => "1Day",
        }
    }

    /// Wall-clock span of a single bar
    pub fn bar_duration(&self) -> Duration {
        match self {
            Resolution::Second => Duration::seconds(1),
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
            Resolution::Day => Duration::days(1),
        }
    }

    /// Span covering `bars` consecutive bars
    pub fn span(&self, bars: usize) -> Duration {
        self.bar_duration() * i32::try_from(bars).unwrap_or(i32::MAX)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_timeframe())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1Sec" | "second" | "Second" => Ok(Resolution::Second),
            "1Min" | "minute" | "Minute" => Ok(Resolution::Minute),
            "1Hour" | "hour" | "Hour" => Ok(Resolution::Hour),
            "1Day" | "day" | "Day" => Ok(Resolution::Day),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One price sample for a single time bucket
///
/// Only `close` feeds the moving averages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub close: f64,
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    pub fn new(symbol: impl Into<String>, close: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            close,
            timestamp,
        }
    }
}

/// Side of the most recently completed dispatch for an instrument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Bought,
    Sold,
}

impl From<OrderSide> for TradeSide {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => TradeSide::Bought,
            OrderSide::Sell => TradeSide::Sold,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Bought => f.write_str("BOUGHT"),
            TradeSide::Sold => f.write_str("SOLD"),
        }
    }
}

/// Side of an order submitted to the venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
}

/// Order submitted to the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: u32,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub client_order_id: String,
}

impl OrderRequest {
    /// Market order, time-in-force "day"
    pub fn market_day(symbol: impl Into<String>, qty: u32, side: OrderSide) -> Self {
        Self {
            symbol: symbol.into(),
            qty,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            client_order_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Venue acknowledgement of an accepted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderConfirmation {
    pub id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub status: String,
}

/// Executed trade, immutable once recorded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: u32,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub order_id: String,
}

/// Market session state reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketClock {
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

/// Account values reported by the venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub buying_power: f64,
}
