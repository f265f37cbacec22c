// Trading strategy module
pub mod crossover;

pub use crossover::CrossoverRule;

/// Trading decision for a single bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}
