use std::collections::VecDeque;

/// Rolling simple moving average over a fixed window of closes
///
/// Produces no value until `window` closes have been observed.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    closes: VecDeque<f64>,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            closes: VecDeque::with_capacity(window),
        }
    }

    /// Reset the window from historical closes (oldest first)
    ///
    /// Only the most recent `window` closes are kept; fewer is fine.
    pub fn seed(&mut self, closes: &[f64]) {
        self.closes.clear();
        let skip = closes.len().saturating_sub(self.window);
        self.closes.extend(closes.iter().skip(skip).copied());
    }

    /// Push a new close, evicting the oldest once full, and return the mean
    pub fn advance(&mut self, close: f64) -> Option<f64> {
        if self.window == 0 {
            return None;
        }

        self.closes.push_back(close);
        while self.closes.len() > self.window {
            self.closes.pop_front();
        }

        self.value()
    }

    /// Current mean without advancing
    pub fn value(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }

        let sum: f64 = self.closes.iter().sum();
        Some(sum / self.window as f64)
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.window > 0 && self.closes.len() >= self.window
    }
}
