// Instrument registry: one tracked record per symbol, seeded once at startup
pub mod instruments;

pub use instruments::{load_instruments, parse_instruments, InstrumentSpec};

use crate::api::Brokerage;
use crate::error::InitializationError;
use crate::indicators::MovingAverage;
use crate::models::{Resolution, TradeSide};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Moving-average parameters shared by every instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedConfig {
    pub resolution: Resolution,
    pub short_window: usize,
    pub long_window: usize,
    /// Seed span = long_window bars × this multiplier
    pub lookback_multiplier: usize,
}

impl SeedConfig {
    pub fn validate(&self) -> Result<(), InitializationError> {
        if self.short_window == 0 || self.long_window == 0 {
            return Err(InitializationError::InvalidWindows {
                short: self.short_window,
                long: self.long_window,
            });
        }
        if self.short_window >= self.long_window {
            tracing::warn!(
                short = self.short_window,
                long = self.long_window,
                "Short window is not shorter than long window; crossover signal will be inverted or flat"
            );
        }
        Ok(())
    }
}

/// Mutable per-instrument state, only touched from the instrument's own bar path
#[derive(Debug)]
struct InstrumentState {
    short: MovingAverage,
    long: MovingAverage,
    last_order_side: TradeSide,
}

/// Tracked instrument: fixed config plus its tracker pair and last order side
#[derive(Debug)]
pub struct TrackedInstrument {
    symbol: String,
    target_quantity: u32,
    resolution: Resolution,
    short_window: usize,
    long_window: usize,
    state: Mutex<InstrumentState>,
}

/// Read-only view for status reporting; no window contents
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InstrumentView {
    pub symbol: String,
    pub target_quantity: u32,
    pub resolution: Resolution,
    pub short_window: usize,
    pub long_window: usize,
    pub short_average: Option<f64>,
    pub long_average: Option<f64>,
    pub last_order_side: TradeSide,
}

impl TrackedInstrument {
    /// Unseeded instrument; starts as `Sold` so the first BUY can fire
    pub fn new(
        symbol: impl Into<String>,
        target_quantity: u32,
        resolution: Resolution,
        short_window: usize,
        long_window: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            target_quantity,
            resolution,
            short_window,
            long_window,
            state: Mutex::new(InstrumentState {
                short: MovingAverage::new(short_window),
                long: MovingAverage::new(long_window),
                last_order_side: TradeSide::Sold,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, InstrumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn target_quantity(&self) -> u32 {
        self.target_quantity
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Seed both trackers from the same historical closes (oldest first)
    pub fn seed(&self, closes: &[f64]) {
        let mut state = self.state();
        state.short.seed(closes);
        state.long.seed(closes);
    }

    /// Advance both trackers by one close, short before long
    pub fn advance(&self, close: f64) -> (Option<f64>, Option<f64>) {
        let mut state = self.state();
        let short = state.short.advance(close);
        let long = state.long.advance(close);
        (short, long)
    }

    pub fn averages(&self) -> (Option<f64>, Option<f64>) {
        let state = self.state();
        (state.short.value(), state.long.value())
    }

    pub fn last_order_side(&self) -> TradeSide {
        self.state().last_order_side
    }

    /// Record the side of a completed dispatch
    pub(crate) fn record_fill(&self, side: TradeSide) {
        self.state().last_order_side = side;
    }

    pub fn view(&self) -> InstrumentView {
        let state = self.state();
        InstrumentView {
            symbol: self.symbol.clone(),
            target_quantity: self.target_quantity,
            resolution: self.resolution,
            short_window: self.short_window,
            long_window: self.long_window,
            short_average: state.short.value(),
            long_average: state.long.value(),
            last_order_side: state.last_order_side,
        }
    }
}

/// Symbol → tracked instrument, keys unique case-insensitively
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    instruments: Vec<Arc<TrackedInstrument>>,
    index: HashMap<String, usize>,
}

impl InstrumentRegistry {
    /// Fetch historical bars for every instrument and seed its trackers
    ///
    /// Any failed fetch aborts: an unseeded tracker never produces a signal.
    pub async fn initialize(
        broker: &dyn Brokerage,
        specs: &[InstrumentSpec],
        config: SeedConfig,
    ) -> Result<Self, InitializationError> {
        config.validate()?;
        if specs.is_empty() {
            return Err(InitializationError::NoInstruments);
        }

        let lookback = config
            .resolution
            .span(config.long_window * config.lookback_multiplier.max(1));
        let mut instruments = Vec::with_capacity(specs.len());

        for spec in specs {
            let end = Utc::now();
            let bars = broker
                .historical_bars(&spec.symbol, config.resolution, end - lookback, end)
                .await
                .map_err(|source| InitializationError::Seed {
                    symbol: spec.symbol.clone(),
                    source,
                })?;

            let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
            let instrument = TrackedInstrument::new(
                spec.symbol.clone(),
                spec.quantity,
                config.resolution,
                config.short_window,
                config.long_window,
            );
            instrument.seed(&closes);

            if closes.len() < config.long_window {
                tracing::warn!(
                    symbol = %spec.symbol,
                    bars = closes.len(),
                    needed = config.long_window,
                    "Seeded with a partial window; signals wait until it fills"
                );
            }
            tracing::info!(
                "Initialized {}, Quantity {}, smaSmall {}, smaLarge {} ({} seed bars)",
                spec.symbol,
                spec.quantity,
                config.short_window,
                config.long_window,
                closes.len()
            );

            instruments.push(instrument);
        }

        Self::from_instruments(instruments)
    }

    /// Build from already-constructed instruments
    pub fn from_instruments(
        instruments: Vec<TrackedInstrument>,
    ) -> Result<Self, InitializationError> {
        let mut registry = Self::default();

        for instrument in instruments {
            let key = instrument.symbol.to_uppercase();
            if registry.index.contains_key(&key) {
                return Err(InitializationError::DuplicateSymbol(instrument.symbol));
            }
            registry.index.insert(key, registry.instruments.len());
            registry.instruments.push(Arc::new(instrument));
        }

        Ok(registry)
    }

    /// Case-insensitive symbol lookup
    pub fn lookup(&self, symbol: &str) -> Option<Arc<TrackedInstrument>> {
        self.index
            .get(&symbol.to_uppercase())
            .map(|&i| self.instruments[i].clone())
    }

    /// Views in registration order
    pub fn snapshot(&self) -> Vec<InstrumentView> {
        self.instruments.iter().map(|i| i.view()).collect()
    }

    pub fn instruments(&self) -> &[Arc<TrackedInstrument>] {
        &self.instruments
    }

    pub fn symbols(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
