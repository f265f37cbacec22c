// In-memory brokerage used by unit tests
use crate::api::Brokerage;
use crate::error::VenueError;
use crate::models::{
    AccountSnapshot, Bar, MarketClock, OrderConfirmation, OrderRequest, Resolution,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scriptable venue: open/closed clock, queued order failures, recorded orders
pub struct MockBroker {
    pub open: AtomicBool,
    pub clock_fails: AtomicBool,
    pub clock_calls: AtomicUsize,
    /// Time from each clock query to the reported `next_close`
    pub session_left: Mutex<Duration>,
    pub order_delay: Mutex<Option<std::time::Duration>>,
    order_failures: Mutex<VecDeque<VenueError>>,
    orders: Mutex<Vec<OrderRequest>>,
    bars: Mutex<Vec<Bar>>,
}

impl MockBroker {
    pub fn open() -> Self {
        Self {
            open: AtomicBool::new(true),
            clock_fails: AtomicBool::new(false),
            clock_calls: AtomicUsize::new(0),
            session_left: Mutex::new(Duration::hours(4)),
            order_delay: Mutex::new(None),
            order_failures: Mutex::new(VecDeque::new()),
            orders: Mutex::new(Vec::new()),
            bars: Mutex::new(Vec::new()),
        }
    }

    pub fn closed() -> Self {
        let broker = Self::open();
        broker.open.store(false, Ordering::SeqCst);
        broker
    }

    pub fn fail_next_order(&self, error: VenueError) {
        self.order_failures.lock().unwrap().push_back(error);
    }

    pub fn set_bars(&self, bars: Vec<Bar>) {
        *self.bars.lock().unwrap() = bars;
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Brokerage for MockBroker {
    async fn historical_bars(
        &self,
        symbol: &str,
        _resolution: Resolution,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, VenueError> {
        Ok(self
            .bars
            .lock()
            .unwrap()
            .iter()
            .filter(|bar| bar.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, VenueError> {
        let delay = *self.order_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.order_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(OrderConfirmation {
            id: format!("order-{}", orders.len()),
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            status: "accepted".to_string(),
        })
    }

    async fn market_clock(&self) -> Result<MarketClock, VenueError> {
        self.clock_calls.fetch_add(1, Ordering::SeqCst);
        if self.clock_fails.load(Ordering::SeqCst) {
            return Err(VenueError::Timeout);
        }
        let now = Utc::now();
        let session_left = *self.session_left.lock().unwrap();
        Ok(MarketClock {
            is_open: self.open.load(Ordering::SeqCst),
            next_open: now + Duration::hours(12),
            next_close: now + session_left,
        })
    }

    async fn account(&self) -> Result<AccountSnapshot, VenueError> {
        Ok(AccountSnapshot {
            equity: 100_000.0,
            buying_power: 200_000.0,
        })
    }
}
