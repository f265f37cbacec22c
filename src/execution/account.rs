use crate::api::Brokerage;
use crate::error::VenueError;
use crate::models::AccountSnapshot;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// `{equity, buying_power, gain_loss_percent}` for the status server
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct AccountView {
    pub equity: f64,
    pub buying_power: f64,
    pub gain_loss_percent: f64,
}

/// Gain/loss of `equity` relative to `baseline`, in percent
pub fn gain_loss_percent(equity: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (equity - baseline) / baseline * 100.0
}

#[derive(Debug, Default)]
struct AccountState {
    baseline_equity: Option<f64>,
    latest: Option<AccountSnapshot>,
}

/// Latest account snapshot plus the equity baseline for gain/loss
///
/// Without a configured baseline, the first observed equity becomes it.
pub struct AccountMonitor {
    broker: Arc<dyn Brokerage>,
    state: RwLock<AccountState>,
}

impl AccountMonitor {
    pub fn new(broker: Arc<dyn Brokerage>, baseline_equity: Option<f64>) -> Self {
        Self {
            broker,
            state: RwLock::new(AccountState {
                baseline_equity,
                latest: None,
            }),
        }
    }

    pub async fn refresh(&self) -> Result<AccountSnapshot, VenueError> {
        let snapshot = self.broker.account().await?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.baseline_equity.is_none() {
            tracing::info!("Baseline equity set to ${:.2}", snapshot.equity);
            state.baseline_equity = Some(snapshot.equity);
        }
        state.latest = Some(snapshot);

        Ok(snapshot)
    }

    pub fn baseline_equity(&self) -> Option<f64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .baseline_equity
    }

    pub fn view(&self) -> Option<AccountView> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let latest = state.latest?;
        let baseline = state.baseline_equity.unwrap_or(latest.equity);

        Some(AccountView {
            equity: latest.equity,
            buying_power: latest.buying_power,
            gain_loss_percent: gain_loss_percent(latest.equity, baseline),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, MarketClock, OrderConfirmation, OrderRequest, Resolution};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct ScriptedAccount {
        equities: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl Brokerage for ScriptedAccount {
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
            Err(VenueError::RateLimited)
        }

        async fn account(&self) -> Result<AccountSnapshot, VenueError> {
            let mut equities = self.equities.lock().unwrap();
            if equities.is_empty() {
                return Err(VenueError::Timeout);
            }
            let equity = equities.remove(0);
            Ok(AccountSnapshot {
                equity,
                buying_power: equity * 2.0,
            })
        }
    }

    fn monitor(equities: Vec<f64>, baseline: Option<f64>) -> AccountMonitor {
        AccountMonitor::new(
            Arc::new(ScriptedAccount {
                equities: Mutex::new(equities),
            }),
            baseline,
        )
    }

    #[test]
    fn test_gain_loss_percent() {
        assert!((gain_loss_percent(110.0, 100.0) - 10.0).abs() < 1e-9);
        assert!((gain_loss_percent(95.0, 100.0) + 5.0).abs() < 1e-9);
        assert_eq!(gain_loss_percent(95.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_first_equity_becomes_baseline() {
        let monitor = monitor(vec![1000.0, 1100.0], None);

        monitor.refresh().await.unwrap();
        assert_eq!(monitor.view().unwrap().gain_loss_percent, 0.0);

        monitor.refresh().await.unwrap();
        let view = monitor.view().unwrap();
        assert_eq!(view.equity, 1100.0);
        assert_eq!(view.buying_power, 2200.0);
        assert!((view.gain_loss_percent - 10.0).abs() < 1e-9);
        assert_eq!(monitor.baseline_equity(), Some(1000.0));
    }

    #[tokio::test]
    async fn test_configured_baseline_wins() {
        let monitor = monitor(vec![900.0], Some(1000.0));

        monitor.refresh().await.unwrap();

        assert!((monitor.view().unwrap().gain_loss_percent + 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_snapshot() {
        let monitor = monitor(vec![1000.0], None);

        monitor.refresh().await.unwrap();
        assert!(monitor.refresh().await.is_err());

        assert_eq!(monitor.view().unwrap().equity, 1000.0);
    }
}
