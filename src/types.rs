//! Common type definitions used throughout the crate

use std::fmt;
use serde::{Deserialize, Serialize};

/// Alignment applied to every buffer size before it reaches a resource
pub const ALLOCATION_ALIGNMENT: u64 = 16;

/// Alignment of addresses handed out by the simulated device
pub const DEVICE_ADDRESS_ALIGNMENT: u64 = 256;

/// Opaque device address returned by a memory resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevicePtr(u64);

impl DevicePtr {
    /// The null device address, returned for zero-byte allocations
    pub const NULL: DevicePtr = DevicePtr(0);

    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kind tag carried by every memory resource.
///
/// The controller decides whether statistics are already active by comparing
/// tags, so a tag must never depend on how the resource was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A resource that obtains memory directly from a device
    Device,
    /// The statistics-tracking adaptor
    Statistics,
    /// Any other adaptor wrapping an upstream resource
    Adaptor,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Device => write!(f, "device"),
            ResourceKind::Statistics => write!(f, "statistics"),
            ResourceKind::Adaptor => write!(f, "adaptor"),
        }
    }
}

/// Round `value` up to the next multiple of `alignment` (a power of two)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
