use crate::api::Brokerage;
use crate::error::VenueError;
use crate::models::MarketClock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// `{currently_open, next_open_at, next_close_at}` for the status server
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HoursView {
    pub currently_open: bool,
    pub next_open_at: DateTime<Utc>,
    pub next_close_at: DateTime<Utc>,
}

impl From<&MarketClock> for HoursView {
    fn from(clock: &MarketClock) -> Self {
        Self {
            currently_open: clock.is_open,
            next_open_at: clock.next_open,
            next_close_at: clock.next_close,
        }
    }
}

/// Whether the session state in `clock` has flipped by `now`
fn clock_expired(clock: &MarketClock, now: DateTime<Utc>) -> bool {
    if clock.is_open {
        now >= clock.next_close
    } else {
        now >= clock.next_open
    }
}

/// Market clock cache
///
/// Every bar consults the clock; a venue round-trip is only made once the
/// cached value is older than `ttl` or its next open/close has passed.
pub struct MarketHours {
    broker: Arc<dyn Brokerage>,
    ttl: Duration,
    cached: RwLock<Option<(Instant, MarketClock)>>,
}

impl MarketHours {
    pub fn new(broker: Arc<dyn Brokerage>, ttl: Duration) -> Self {
        Self {
            broker,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Cached clock if fresh, otherwise fetched from the venue
    pub async fn current(&self) -> Result<MarketClock, VenueError> {
        if let Some(clock) = self.fresh() {
            return Ok(clock);
        }
        self.refresh().await
    }

    /// Fetch from the venue unconditionally and cache the result
    pub async fn refresh(&self) -> Result<MarketClock, VenueError> {
        let clock = self.broker.market_clock().await?;
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) =
            Some((Instant::now(), clock.clone()));
        Ok(clock)
    }

    fn fresh(&self) -> Option<MarketClock> {
        let now = Utc::now();
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|(fetched_at, clock)| fetched_at.elapsed() < self.ttl && !clock_expired(clock, now))
            .map(|(_, clock)| clock.clone())
    }

    /// Last observed clock regardless of age
    pub fn last_known(&self) -> Option<MarketClock> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, clock)| clock.clone())
    }

    pub fn view(&self) -> Option<HoursView> {
        self.last_known().as_ref().map(HoursView::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountSnapshot, Bar, OrderConfirmation, OrderRequest, Resolution};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClock {
        calls: AtomicUsize,
        fail: bool,
        session_left: chrono::Duration,
    }

    impl CountingClock {
        /// Open on the first query only, closing `session_left` after each query
        fn new(fail: bool, session_left: chrono::Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
                session_left,
            }
        }
    }

    #[async_trait]
    impl Brokerage for CountingClock {
        async fn historical_bars(
            &self,
            _symbol: &str,
            _resolution: Resolution,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Bar>, VenueError> {
            Ok(Vec::new())
        }

        async fn place_order(&self, _order: &OrderRequest) -> Result<OrderConfirmation, VenueError> {
            Err(VenueError::RateLimited)
        }

        async fn market_clock(&self) -> Result<MarketClock, VenueError> {
            let previous = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VenueError::Timeout);
            }
            let now = Utc::now();
            Ok(MarketClock {
                is_open: previous == 0,
                next_open: now + chrono::Duration::hours(12),
                next_close: now + self.session_left,
            })
        }

        async fn account(&self) -> Result<AccountSnapshot, VenueError> {
            Err(VenueError::RateLimited)
        }
    }

    #[tokio::test]
    async fn test_fresh_clock_is_served_from_cache() {
        let broker = Arc::new(CountingClock::new(false, chrono::Duration::hours(4)));
        let hours = MarketHours::new(broker.clone(), Duration::from_secs(60));

        assert!(hours.current().await.unwrap().is_open);
        assert!(hours.current().await.unwrap().is_open);

        assert_eq!(broker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_clock_is_refetched() {
        let broker = Arc::new(CountingClock::new(false, chrono::Duration::hours(4)));
        let hours = MarketHours::new(broker.clone(), Duration::from_secs(30));

        hours.current().await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        hours.current().await.unwrap();

        assert_eq!(broker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clock_past_its_close_is_refetched() {
        let broker = Arc::new(CountingClock::new(false, chrono::Duration::milliseconds(100)));
        let hours = MarketHours::new(broker.clone(), Duration::from_secs(60));

        assert!(hours.current().await.unwrap().is_open);
        tokio::time::sleep(Duration::from_millis(150)).await;

        // well inside the TTL, but the session has ended
        assert!(!hours.current().await.unwrap().is_open);
        assert_eq!(broker.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clock_expiry_follows_session_state() {
        let now = Utc::now();
        let open = MarketClock {
            is_open: true,
            next_open: now + chrono::Duration::hours(20),
            next_close: now - chrono::Duration::seconds(1),
        };
        assert!(clock_expired(&open, now));

        let closed = MarketClock {
            is_open: false,
            next_open: now + chrono::Duration::hours(2),
            next_close: now - chrono::Duration::hours(1),
        };
        assert!(!clock_expired(&closed, now));
        assert!(clock_expired(&closed, now + chrono::Duration::hours(3)));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_view_empty() {
        let broker = Arc::new(CountingClock::new(true, chrono::Duration::hours(4)));
        let hours = MarketHours::new(broker, Duration::from_secs(30));

        assert!(hours.current().await.is_err());
        assert!(hours.view().is_none());
    }
}
