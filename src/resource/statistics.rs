use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::metrics::{Counter, CounterStack, Statistics};
use crate::types::{DevicePtr, ResourceKind};
use super::{MemoryResource, SharedResource};

/// Adaptor that forwards to an upstream resource and tracks the current,
/// peak and total number of bytes and allocations that pass through it.
///
/// Allocations made before the adaptor was constructed are not tracked. To
/// observe all traffic the adaptor has to stay the topmost resource of the
/// registry for as long as statistics are gathered.
#[derive(Debug)]
pub struct StatisticsResourceAdaptor {
    upstream: SharedResource,
    counters: CounterStack,
}

impl StatisticsResourceAdaptor {
    pub fn new(upstream: SharedResource) -> Self {
        Self {
            upstream,
            counters: CounterStack::new(),
        }
    }

    /// Construct the adaptor behind a shared handle
    pub fn shared(upstream: SharedResource) -> SharedResource {
        Arc::new(Self::new(upstream))
    }

    pub fn upstream_resource(&self) -> &SharedResource {
        &self.upstream
    }

    /// Statistics of the innermost counter block
    pub fn allocation_counts(&self) -> Statistics {
        self.counters.snapshot()
    }

    pub fn bytes_counter(&self) -> Counter {
        self.counters.bytes()
    }

    pub fn allocations_counter(&self) -> Counter {
        self.counters.allocations()
    }

    /// Open a nested counter block, returning the statistics of the enclosing one
    pub fn push_counters(&self) -> Statistics {
        self.counters.push()
    }

    /// Close the innermost counter block and return its statistics.
    ///
    /// Fails with `CounterUnderflow` when only the base block is left.
    pub fn pop_counters(&self) -> Result<Statistics> {
        self.counters.pop()
    }

    /// Number of open counter blocks, including the base block
    pub fn counter_depth(&self) -> usize {
        self.counters.depth()
    }
}

impl MemoryResource for StatisticsResourceAdaptor {
    fn allocate(&self, bytes: u64) -> Result<DevicePtr> {
        let ptr = self.upstream.allocate(bytes)?;
        self.counters.record_allocation(bytes);
        Ok(ptr)
    }

    fn deallocate(&self, ptr: DevicePtr, bytes: u64) -> Result<()> {
        self.upstream.deallocate(ptr, bytes)?;
        self.counters.record_deallocation(bytes);
        Ok(())
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Statistics
    }

    fn name(&self) -> &'static str {
        "statistics_resource_adaptor"
    }

    fn upstream(&self) -> Option<&SharedResource> {
        Some(&self.upstream)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
