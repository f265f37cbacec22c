// Error taxonomy for the trading agent
use crate::models::OrderSide;
use thiserror::Error;

/// Any failed call against the brokerage venue
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by venue")]
    RateLimited,

    #[error("Venue returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed venue response: {0}")]
    Decode(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VenueError::Timeout
        } else if e.is_decode() {
            VenueError::Decode(e.to_string())
        } else {
            VenueError::Http(e)
        }
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(e: serde_json::Error) -> Self {
        VenueError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VenueError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        VenueError::Stream(e.to_string())
    }
}

/// Fatal startup failure; the agent never runs partially seeded
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to read instrument list {path}: {source}")]
    InstrumentList {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid instrument entry: {0}")]
    InvalidInstrument(String),

    #[error("Instrument list is empty")]
    NoInstruments,

    #[error("Duplicate symbol in instrument list: {0}")]
    DuplicateSymbol(String),

    #[error("Moving-average windows must be positive (short={short}, long={long})")]
    InvalidWindows { short: usize, long: usize },

    #[error("Failed to seed {symbol} from historical bars: {source}")]
    Seed {
        symbol: String,
        #[source]
        source: VenueError,
    },
}

/// Order placement failure; never fatal, never mutates state
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{side} order for {symbol} rejected: {source}")]
    Venue {
        symbol: String,
        side: OrderSide,
        #[source]
        source: VenueError,
    },

    #[error("{side} order for {symbol} timed out after {secs}s (client order id {client_order_id})")]
    Timeout {
        symbol: String,
        side: OrderSide,
        secs: u64,
        /// The venue may still have accepted this order
        client_order_id: String,
    },
}
