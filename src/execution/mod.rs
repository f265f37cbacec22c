pub mod account;
pub mod dispatcher;
pub mod engine;
pub mod ledger;
pub mod market_hours;
pub mod polling;
pub mod router;

pub use account::{AccountMonitor, AccountView};
pub use dispatcher::OrderDispatcher;
pub use engine::{BarOutcome, SignalEngine};
pub use ledger::TradeLedger;
pub use market_hours::{HoursView, MarketHours};
pub use polling::{poll_once, run_polling_loop, PollingConfig};
pub use router::BarRouter;
