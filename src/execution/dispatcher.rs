use super::TradeLedger;
use crate::api::Brokerage;
use crate::error::DispatchError;
use crate::models::{Bar, OrderRequest, OrderSide, Trade, TradeSide};
use crate::registry::TrackedInstrument;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Places orders and records the resulting trades
///
/// State changes only on success: the instrument's last side flips and the
/// trade lands in the ledger before `execute` returns.
#[derive(Clone)]
pub struct OrderDispatcher {
    broker: Arc<dyn Brokerage>,
    ledger: TradeLedger,
    timeout: Duration,
}

impl OrderDispatcher {
    pub fn new(broker: Arc<dyn Brokerage>, ledger: TradeLedger, timeout: Duration) -> Self {
        Self {
            broker,
            ledger,
            timeout,
        }
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    /// Market order for the instrument's target quantity, time-in-force day
    pub async fn execute(
        &self,
        instrument: &TrackedInstrument,
        side: OrderSide,
        bar: &Bar,
    ) -> Result<Trade, DispatchError> {
        let order = OrderRequest::market_day(instrument.symbol(), instrument.target_quantity(), side);

        let confirmation = match tokio::time::timeout(self.timeout, self.broker.place_order(&order)).await {
            Ok(Ok(confirmation)) => confirmation,
            Ok(Err(source)) => {
                return Err(DispatchError::Venue {
                    symbol: instrument.symbol().to_string(),
                    side,
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    symbol = %order.symbol,
                    client_order_id = %order.client_order_id,
                    "Order timed out; reconcile against the venue before trading manually"
                );
                return Err(DispatchError::Timeout {
                    symbol: instrument.symbol().to_string(),
                    side,
                    secs: self.timeout.as_secs(),
                    client_order_id: order.client_order_id.clone(),
                });
            }
        };

        let trade_side = TradeSide::from(side);
        let trade = Trade {
            id: Uuid::new_v4(),
            symbol: instrument.symbol().to_string(),
            side: trade_side,
            quantity: instrument.target_quantity(),
            price: bar.close,
            timestamp: bar.timestamp,
            order_id: confirmation.id,
        };

        instrument.record_fill(trade_side);
        self.ledger.append(trade.clone());

        tracing::info!(
            "[{}] {} {} {} @ ${:.2}",
            trade.timestamp.to_rfc3339(),
            trade.side,
            trade.quantity,
            trade.symbol,
            trade.price
        );

        Ok(trade)
    }
}
