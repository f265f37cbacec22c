use super::{AccountMonitor, BarRouter, MarketHours};
use crate::api::Brokerage;
use crate::registry::InstrumentRegistry;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct PollingConfig {
    pub interval: Duration,
    /// How far back each poll looks for bars
    pub window: Duration,
}

/// Periodic fallback ingestion alongside the live stream
///
/// Each tick refreshes the clock and account snapshots, then fetches the
/// recent bars of every instrument and routes the latest one. Failures are
/// logged and the loop carries on.
pub async fn run_polling_loop(
    broker: Arc<dyn Brokerage>,
    registry: Arc<InstrumentRegistry>,
    router: BarRouter,
    hours: Arc<MarketHours>,
    account: Arc<AccountMonitor>,
    config: PollingConfig,
) {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        "🔄 Polling every {}s for the last {}s of bars",
        config.interval.as_secs(),
        config.window.as_secs()
    );

    loop {
        ticker.tick().await;
        poll_once(broker.as_ref(), &registry, &router, &hours, &account, config.window).await;
    }
}

/// One polling pass; returns the number of bars routed
pub async fn poll_once(
    broker: &dyn Brokerage,
    registry: &InstrumentRegistry,
    router: &BarRouter,
    hours: &MarketHours,
    account: &AccountMonitor,
    window: Duration,
) -> usize {
    if let Err(e) = hours.refresh().await {
        tracing::warn!("Failed to refresh market clock: {}", e);
    }
    if let Err(e) = account.refresh().await {
        tracing::warn!("Failed to refresh account: {}", e);
    }

    let lookback = match chrono::Duration::from_std(window) {
        Ok(lookback) => lookback,
        Err(e) => {
            tracing::error!("Invalid polling window: {}", e);
            return 0;
        }
    };

    let mut routed = 0;
    for instrument in registry.instruments() {
        let end = Utc::now();
        let bars = match broker
            .historical_bars(instrument.symbol(), instrument.resolution(), end - lookback, end)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(symbol = %instrument.symbol(), "Polling fetch failed: {}", e);
                continue;
            }
        };

        let Some(latest) = bars.into_iter().max_by_key(|bar| bar.timestamp) else {
            tracing::debug!(symbol = %instrument.symbol(), "No new bars");
            continue;
        };

        if router.route(latest) {
            routed += 1;
        }
    }

    routed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{OrderDispatcher, SignalEngine, TradeLedger};
    use crate::models::{Bar, Resolution, TradeSide};
    use crate::registry::TrackedInstrument;
    use crate::testing::MockBroker;
    use std::sync::atomic::Ordering;

    struct Harness {
        broker: Arc<MockBroker>,
        registry: Arc<InstrumentRegistry>,
        router: BarRouter,
        handles: Vec<tokio::task::JoinHandle<()>>,
        hours: Arc<MarketHours>,
        account: Arc<AccountMonitor>,
        ledger: TradeLedger,
    }

    fn harness() -> Harness {
        let broker = Arc::new(MockBroker::open());
        let instrument = TrackedInstrument::new("AAPL", 10, Resolution::Minute, 3, 5);
        instrument.seed(&[10.0; 5]);
        let registry = Arc::new(InstrumentRegistry::from_instruments(vec![instrument]).unwrap());

        let ledger = TradeLedger::new();
        let hours = Arc::new(MarketHours::new(broker.clone(), Duration::from_secs(30)));
        let account = Arc::new(AccountMonitor::new(broker.clone(), None));
        let dispatcher = OrderDispatcher::new(broker.clone(), ledger.clone(), Duration::from_secs(5));
        let engine = Arc::new(SignalEngine::new(hours.clone(), dispatcher));
        let (router, handles) = BarRouter::spawn(registry.clone(), engine, 16);

        Harness {
            broker,
            registry,
            router,
            handles,
            hours,
            account,
            ledger,
        }
    }

    impl Harness {
        async fn poll(&self) -> usize {
            poll_once(
                self.broker.as_ref(),
                &self.registry,
                &self.router,
                &self.hours,
                &self.account,
                Duration::from_secs(15),
            )
            .await
        }

        async fn drain(self) {
            drop(self.router);
            for handle in self.handles {
                handle.await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_empty_poll_is_a_no_op() {
        let h = harness();

        assert_eq!(h.poll().await, 0);

        assert!(h.hours.view().is_some());
        assert!(h.account.view().is_some());
        assert_eq!(h.registry.lookup("AAPL").unwrap().averages(), (Some(10.0), Some(10.0)));
    }

    #[tokio::test]
    async fn test_latest_bar_is_routed() {
        let h = harness();
        let now = Utc::now();
        h.broker.set_bars(vec![
            Bar::new("AAPL", 5.0, now - chrono::Duration::seconds(10)),
            Bar::new("AAPL", 11.0, now),
        ]);

        assert_eq!(h.poll().await, 1);
        let ledger = h.ledger.clone();
        let registry = h.registry.clone();
        h.drain().await;

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.list_newest_first()[0].price, 11.0);
        assert_eq!(registry.lookup("AAPL").unwrap().last_order_side(), TradeSide::Bought);
    }

    #[tokio::test]
    async fn test_refresh_failures_do_not_stop_fetching() {
        let h = harness();
        h.broker.clock_fails.store(true, Ordering::SeqCst);
        h.broker.set_bars(vec![Bar::new("AAPL", 11.0, Utc::now())]);

        assert_eq!(h.poll().await, 1);
        assert!(h.hours.view().is_none());
    }
}
