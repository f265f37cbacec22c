use super::{MarketHours, OrderDispatcher};
use crate::models::{Bar, OrderSide, Trade};
use crate::registry::TrackedInstrument;
use crate::strategy::{CrossoverRule, Signal};
use std::sync::Arc;

/// What happened to one incoming bar
#[derive(Debug, Clone, PartialEq)]
pub enum BarOutcome {
    /// Market closed; trackers untouched
    MarketClosed,
    /// Clock query failed; bar skipped, trackers untouched
    ClockUnavailable,
    /// Trackers advanced but a window is still filling
    WarmingUp,
    Hold,
    Executed(Trade),
    /// Signal fired but the order failed; last side unchanged
    DispatchFailed,
}

/// Bar → trackers → crossover rule → dispatcher
///
/// Callers must deliver bars for one instrument sequentially; the router
/// guarantees this with one worker per instrument.
pub struct SignalEngine {
    hours: Arc<MarketHours>,
    dispatcher: OrderDispatcher,
    rule: CrossoverRule,
}

impl SignalEngine {
    pub fn new(hours: Arc<MarketHours>, dispatcher: OrderDispatcher) -> Self {
        Self {
            hours,
            dispatcher,
            rule: CrossoverRule::new(),
        }
    }

    pub fn dispatcher(&self) -> &OrderDispatcher {
        &self.dispatcher
    }

    pub async fn on_bar(&self, instrument: &TrackedInstrument, bar: &Bar) -> BarOutcome {
        match self.hours.current().await {
            Ok(clock) if !clock.is_open => {
                tracing::debug!(symbol = %bar.symbol, "Market closed, bar discarded");
                return BarOutcome::MarketClosed;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(symbol = %bar.symbol, "Market clock unavailable, bar skipped: {}", e);
                return BarOutcome::ClockUnavailable;
            }
        }

        let (short, long) = instrument.advance(bar.close);
        let (short, long) = match (short, long) {
            (Some(short), Some(long)) => (short, long),
            _ => return BarOutcome::WarmingUp,
        };

        let last_side = instrument.last_order_side();
        let side = match self.rule.evaluate(short, long, last_side) {
            Signal::Buy => OrderSide::Buy,
            Signal::Sell => OrderSide::Sell,
            Signal::Hold => {
                tracing::debug!(
                    symbol = %bar.symbol,
                    short,
                    long,
                    last = %last_side,
                    "Hold"
                );
                return BarOutcome::Hold;
            }
        };

        tracing::info!(
            "📈 {} signal for {}: short {:.4} vs long {:.4} @ ${:.2}",
            side.as_str().to_uppercase(),
            instrument.symbol(),
            short,
            long,
            bar.close
        );

        match self.dispatcher.execute(instrument, side, bar).await {
            Ok(trade) => BarOutcome::Executed(trade),
            Err(e) => {
                tracing::error!("❌ {}", e);
                BarOutcome::DispatchFailed
            }
        }
    }
}
