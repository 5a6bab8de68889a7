//! Allocation counters and statistics snapshots

mod collector;
mod types;

pub use collector::CounterStack;
pub use types::{Counter, Statistics};
