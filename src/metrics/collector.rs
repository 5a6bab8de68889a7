use parking_lot::RwLock;

use crate::error::{DeviceMemoryError, Result};
use super::types::{Counter, Statistics};

/// Stack of `(bytes, allocations)` counter pairs.
///
/// Allocations and deallocations only touch the top pair. Pushing opens a
/// nested block with zeroed counters; popping folds the block back into the
/// pair below it. The bottom pair can never be popped.
#[derive(Debug)]
pub struct CounterStack {
    state: RwLock<Vec<CounterPair>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct CounterPair {
    bytes: Counter,
    allocations: Counter,
}

impl CounterPair {
    fn snapshot(&self) -> Statistics {
        Statistics::from_counters(&self.bytes, &self.allocations)
    }
}

impl CounterStack {
    /// Create a stack holding a single zeroed pair
    pub fn new() -> Self {
        Self {
            state: RwLock::new(vec![CounterPair::default()]),
        }
    }

    /// Record an allocation of `bytes` in the top pair
    pub fn record_allocation(&self, bytes: u64) {
        let mut state = self.state.write();
        if let Some(top) = state.last_mut() {
            top.bytes.add(bytes as i64);
            top.allocations.add(1);
        }
    }

    /// Record a deallocation of `bytes` in the top pair
    pub fn record_deallocation(&self, bytes: u64) {
        let mut state = self.state.write();
        if let Some(top) = state.last_mut() {
            top.bytes.sub(bytes as i64);
            top.allocations.sub(1);
        }
    }

    /// Statistics of the top pair
    pub fn snapshot(&self) -> Statistics {
        self.top().snapshot()
    }

    /// Bytes counter of the top pair
    pub fn bytes(&self) -> Counter {
        self.top().bytes
    }

    /// Allocation-count counter of the top pair
    pub fn allocations(&self) -> Counter {
        self.top().allocations
    }

    /// Number of pairs on the stack, at least one
    pub fn depth(&self) -> usize {
        self.state.read().len()
    }

    /// Push a zeroed pair and return the statistics of the previous top
    pub fn push(&self) -> Statistics {
        let mut state = self.state.write();
        let previous = state.last().copied().unwrap_or_default();
        state.push(CounterPair::default());
        previous.snapshot()
    }

    /// Pop the top pair, fold it into the new top and return its statistics
    pub fn pop(&self) -> Result<Statistics> {
        let mut state = self.state.write();
        if state.len() < 2 {
            return Err(DeviceMemoryError::CounterUnderflow);
        }
        let popped = state.pop().ok_or(DeviceMemoryError::CounterUnderflow)?;
        if let Some(top) = state.last_mut() {
            top.bytes.absorb(&popped.bytes);
            top.allocations.absorb(&popped.allocations);
        }
        Ok(popped.snapshot())
    }

    fn top(&self) -> CounterPair {
        self.state.read().last().copied().unwrap_or_default()
    }
}

impl Default for CounterStack {
    fn default() -> Self {
        Self::new()
    }
}
