use super::{BarOutcome, SignalEngine};
use crate::models::{Bar, Resolution};
use crate::registry::{InstrumentRegistry, TrackedInstrument};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fans bars out to one FIFO worker per instrument
///
/// Bars for one symbol are handled strictly in arrival order, one at a time;
/// a slow order for one symbol never delays another symbol's bars.
#[derive(Clone)]
pub struct BarRouter {
    queues: Arc<HashMap<String, Queue>>,
}

struct Queue {
    tx: mpsc::Sender<Bar>,
    resolution: Resolution,
}

impl BarRouter {
    pub fn spawn(
        registry: Arc<InstrumentRegistry>,
        engine: Arc<SignalEngine>,
        capacity: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let mut queues = HashMap::with_capacity(registry.len());
        let mut handles = Vec::with_capacity(registry.len());

        for instrument in registry.instruments() {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            queues.insert(
                instrument.symbol().to_uppercase(),
                Queue {
                    tx,
                    resolution: instrument.resolution(),
                },
            );
            handles.push(tokio::spawn(run_worker(
                instrument.clone(),
                engine.clone(),
                rx,
            )));
        }

        (
            Self {
                queues: Arc::new(queues),
            },
            handles,
        )
    }

    /// Enqueue a bar for its instrument; returns false if it was dropped
    pub fn route(&self, bar: Bar) -> bool {
        let Some(queue) = self.queues.get(&bar.symbol.to_uppercase()) else {
            tracing::debug!(symbol = %bar.symbol, "Bar for unknown symbol ignored");
            return false;
        };

        match queue.tx.try_send(bar) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(bar)) => {
                tracing::warn!(symbol = %bar.symbol, "Bar queue full, dropping bar");
                false
            }
            Err(mpsc::error::TrySendError::Closed(bar)) => {
                tracing::error!(symbol = %bar.symbol, "Bar worker stopped, dropping bar");
                false
            }
        }
    }

    /// Route everything arriving on `bars` until the sender side closes
    ///
    /// `resolution` is the granularity of the producer; bars are only
    /// delivered to instruments tracking that same resolution.
    pub async fn forward(&self, mut bars: mpsc::Receiver<Bar>, resolution: Resolution) {
        while let Some(bar) = bars.recv().await {
            if !self.accepts(&bar.symbol, resolution) {
                tracing::warn!(
                    symbol = %bar.symbol,
                    "{} bar does not match the instrument resolution, dropping",
                    resolution
                );
                continue;
            }
            self.route(bar);
        }
    }

    fn accepts(&self, symbol: &str, resolution: Resolution) -> bool {
        self.queues
            .get(&symbol.to_uppercase())
            .map_or(true, |queue| queue.resolution == resolution)
    }
}

async fn run_worker(
    instrument: Arc<TrackedInstrument>,
    engine: Arc<SignalEngine>,
    mut bars: mpsc::Receiver<Bar>,
) {
    while let Some(bar) = bars.recv().await {
        if let BarOutcome::Executed(trade) = engine.on_bar(&instrument, &bar).await {
            tracing::debug!(symbol = %trade.symbol, id = %trade.id, "Trade recorded");
        }
    }
    tracing::debug!(symbol = %instrument.symbol(), "Bar worker finished");
}
