use crate::models::Trade;
use std::sync::{Arc, PoisonError, RwLock};

/// Append-only in-memory log of executed trades
///
/// Clones share storage, so an append is visible to every reader as soon
/// as `append` returns. Unbounded; one trading session's worth of trades.
#[derive(Clone, Default)]
pub struct TradeLedger {
    trades: Arc<RwLock<Vec<Trade>>>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, trade: Trade) {
        self.trades
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trade);
    }

    /// Presentation order; storage stays oldest-first
    pub fn list_newest_first(&self) -> Vec<Trade> {
        self.trades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trades.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
