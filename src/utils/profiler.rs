use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::metrics::Statistics;
use crate::resource::{registry, ResourceRegistry};
use crate::statistics::{pop_statistics_in, push_statistics_in};

lazy_static! {
    static ref DEFAULT_RECORDS: Arc<ProfilerRecords> = Arc::new(ProfilerRecords::new());
}

/// Memory usage of a named function or code block, accumulated over calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    /// Number of times the block ran
    pub num_calls: u64,
    /// Bytes allocated by the block, summed over all calls
    pub memory_total: i64,
    /// Largest peak of bytes allocated during a single call
    pub memory_peak: i64,
}

impl ProfileData {
    fn add(&mut self, stats: &Statistics) {
        self.num_calls += 1;
        self.memory_total += stats.total_bytes;
        self.memory_peak = self.memory_peak.max(stats.peak_bytes);
    }
}

/// Column used to order [`ProfilerRecords::pretty_print`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    NumCalls,
    MemoryPeak,
    MemoryTotal,
}

impl OrderBy {
    fn key(&self, data: &ProfileData) -> i64 {
        match self {
            OrderBy::NumCalls => data.num_calls as i64,
            OrderBy::MemoryPeak => data.memory_peak,
            OrderBy::MemoryTotal => data.memory_total,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            OrderBy::NumCalls => "num_calls",
            OrderBy::MemoryPeak => "memory_peak",
            OrderBy::MemoryTotal => "memory_total",
        }
    }
}

/// Memory profile of named code blocks.
///
/// Profiling a block opens a nested counter block on the current statistics
/// adaptor and folds the block's statistics into the record when it ends.
/// Nothing is recorded while statistics are disabled.
#[derive(Debug, Default)]
pub struct ProfilerRecords {
    records: RwLock<HashMap<String, ProfileData>>,
}

impl ProfilerRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide records used by [`profile_span!`](crate::profile_span)
    pub fn global() -> Arc<ProfilerRecords> {
        Arc::clone(&DEFAULT_RECORDS)
    }

    /// Start profiling `name` on the default device's registry
    pub fn start_span(&self, name: impl Into<String>) -> ProfilerGuard<'_> {
        self.start_span_in(registry::global(), name)
    }

    /// Start profiling `name` on `registry`
    pub fn start_span_in(
        &self,
        registry: Arc<ResourceRegistry>,
        name: impl Into<String>,
    ) -> ProfilerGuard<'_> {
        let active = push_statistics_in(&registry).is_some();
        ProfilerGuard {
            records: self,
            registry,
            name: name.into(),
            active,
        }
    }

    /// Run `f` as a profiled block named `name` on `registry`
    pub fn profile<T>(
        &self,
        registry: Arc<ResourceRegistry>,
        name: impl Into<String>,
        f: impl FnOnce() -> T,
    ) -> T {
        let _guard = self.start_span_in(registry, name);
        f()
    }

    /// Add the statistics of one finished call of `name`
    pub fn add(&self, name: &str, stats: &Statistics) {
        let mut records = self.records.write();
        records.entry(name.to_string()).or_default().add(stats);
    }

    pub fn get(&self, name: &str) -> Option<ProfileData> {
        self.records.read().get(name).copied()
    }

    /// Copy of all records
    pub fn records(&self) -> HashMap<String, ProfileData> {
        self.records.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn reset(&self) {
        self.records.write().clear();
    }

    /// Render the records as a table, largest first
    pub fn pretty_print(&self, order: OrderBy) -> String {
        let mut sorted: Vec<_> = self.records().into_iter().collect();
        sorted.sort_by(|a, b| {
            order
                .key(&b.1)
                .cmp(&order.key(&a.1))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut out = String::from("Memory Profiling\n================\n\n");
        if sorted.is_empty() {
            out.push_str("No data, maybe profiling wasn't enabled?");
            return out;
        }

        out.push_str("Legends:\n");
        out.push_str("  ncalls       - number of times the function or code block was called\n");
        out.push_str("  memory_peak  - peak memory allocated in function or code block (in bytes)\n");
        out.push_str("  memory_total - total memory allocated in function or code block (in bytes)\n");
        let _ = writeln!(out, "\nOrdered by: {}\n", order.label());
        out.push_str("ncalls     memory_peak    memory_total  filename:lineno(function)");

        for (name, data) in sorted {
            let _ = write!(
                out,
                "\n{:>6} {:>15} {:>15}  {}",
                data.num_calls, data.memory_peak, data.memory_total, name
            );
        }
        out
    }
}

/// Profiles a block until dropped
pub struct ProfilerGuard<'a> {
    records: &'a ProfilerRecords,
    registry: Arc<ResourceRegistry>,
    name: String,
    active: bool,
}

impl<'a> Drop for ProfilerGuard<'a> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        match pop_statistics_in(&self.registry) {
            Ok(Some(stats)) => self.records.add(&self.name, &stats),
            Ok(None) => {
                tracing::warn!(name = %self.name, "Statistics were disabled inside a profiled block");
            }
            Err(e) => {
                tracing::warn!(name = %self.name, "Failed to close profiled block: {}", e);
            }
        }
    }
}

/// Profile the rest of the enclosing scope into the process-wide records.
///
/// Without a name the block is named after its source location.
#[macro_export]
macro_rules! profile_span {
    () => {
        let _profile_guard = $crate::utils::ProfilerRecords::global();
        let _profile_guard = _profile_guard.start_span(concat!(
            file!(),
            ":",
            line!(),
            "(",
            module_path!(),
            ")"
        ));
    };
    ($name:expr) => {
        let _profile_guard = $crate::utils::ProfilerRecords::global();
        let _profile_guard = _profile_guard.start_span($name);
    };
}
