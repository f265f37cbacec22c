pub mod alpaca;
pub mod stream;

pub use alpaca::{AlpacaClient, AlpacaConfig};
pub use stream::{LiveBarStream, StreamConfig, TradeUpdateStream};

use crate::error::VenueError;
use crate::models::{AccountSnapshot, Bar, MarketClock, OrderConfirmation, OrderRequest, Resolution};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Brokerage venue capability consumed by the engine
///
/// Every call may fail with a `VenueError`; callers decide whether that
/// skips a cycle or surfaces as a dispatch failure.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Bars for `symbol` in `[start, end]`, oldest first
    async fn historical_bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, VenueError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, VenueError>;

    async fn market_clock(&self) -> Result<MarketClock, VenueError>;

    async fn account(&self) -> Result<AccountSnapshot, VenueError>;
}
