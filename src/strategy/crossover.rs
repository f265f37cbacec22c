use super::Signal;
use crate::models::TradeSide;

/// Dual moving-average crossover, edge-triggered on the last completed side
///
/// Fires BUY when the short average is strictly above the long one and the
/// instrument is not already bought, SELL on the mirror condition. Equal
/// averages never fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossoverRule;

impl CrossoverRule {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, short: f64, long: f64, last_side: TradeSide) -> Signal {
        if short > long && last_side != TradeSide::Bought {
            Signal::Buy
        } else if short < long && last_side != TradeSide::Sold {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}
