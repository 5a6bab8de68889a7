use serde::{Deserialize, Serialize};

/// Current, peak and total value of a tracked quantity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Current value
    pub value: i64,
    /// Highest `value` observed
    pub peak: i64,
    /// Sum of all added values
    pub total: i64,
}

impl Counter {
    /// Add `amount` to the current value and raise the peak if needed
    pub fn add(&mut self, amount: i64) {
        self.value += amount;
        self.total += amount;
        self.peak = self.peak.max(self.value);
    }

    /// Subtract `amount` from the current value
    pub fn sub(&mut self, amount: i64) {
        self.value -= amount;
    }

    /// Fold the counter of a finished nested block into this one.
    ///
    /// The nested block's peak is relative to where this counter stood when
    /// the block started, so it is offset by the current value.
    pub fn absorb(&mut self, nested: &Counter) {
        self.peak = self.peak.max(self.value + nested.peak);
        self.value += nested.value;
        self.total += nested.total;
    }
}

/// Snapshot of allocation statistics.
///
/// Values are signed: a block that frees memory allocated before it started
/// reports negative current bytes and counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub current_bytes: i64,
    pub current_count: i64,
    pub peak_bytes: i64,
    pub peak_count: i64,
    pub total_bytes: i64,
    pub total_count: i64,
}

impl Statistics {
    /// Build a snapshot from a bytes counter and an allocation-count counter
    pub fn from_counters(bytes: &Counter, count: &Counter) -> Self {
        Self {
            current_bytes: bytes.value,
            current_count: count.value,
            peak_bytes: bytes.peak,
            peak_count: count.peak,
            total_bytes: bytes.total,
            total_count: count.total,
        }
    }
}
