// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod registry;
pub mod server;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use api::Brokerage;
pub use error::{DispatchError, InitializationError, VenueError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
