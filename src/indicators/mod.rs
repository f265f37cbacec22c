// Technical indicators module
// Rolling simple moving averages for the crossover signal

pub mod moving_average;

pub use moving_average::MovingAverage;
