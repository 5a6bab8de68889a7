use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::DeviceConfig;
use crate::error::{DeviceMemoryError, Result};
use crate::types::{
    align_up, DevicePtr, ResourceKind, ALLOCATION_ALIGNMENT, DEVICE_ADDRESS_ALIGNMENT,
};
use super::MemoryResource;

const ADDRESS_SPACE_BASE: u64 = 0x7f00_0000_0000;
const ADDRESS_SPACE_STRIDE: u64 = 1 << 40;

/// Leaf resource that models a device address space.
///
/// Hands out unique aligned addresses, keeps a table of live allocations and
/// enforces an optional capacity. Requests are rounded up to the allocation
/// granularity before they count against the capacity. No memory is actually
/// reserved.
#[derive(Debug)]
pub struct SimulatedDeviceResource {
    device_id: usize,
    capacity: Option<u64>,
    alignment: u64,
    next_addr: AtomicU64,
    used_bytes: AtomicU64,
    live: DashMap<u64, u64>,
}

impl SimulatedDeviceResource {
    /// Create an unbounded resource for `device_id`
    pub fn new(device_id: usize) -> Self {
        Self {
            device_id,
            capacity: None,
            alignment: ALLOCATION_ALIGNMENT,
            next_addr: AtomicU64::new(ADDRESS_SPACE_BASE + device_id as u64 * ADDRESS_SPACE_STRIDE),
            used_bytes: AtomicU64::new(0),
            live: DashMap::new(),
        }
    }

    /// Create a resource that refuses to hold more than `capacity` bytes
    pub fn with_capacity(device_id: usize, capacity: u64) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(device_id)
        }
    }

    /// Round every request up to `alignment`, which must be a power of two
    pub fn with_alignment(self, alignment: u64) -> Self {
        debug_assert!(alignment.is_power_of_two());
        Self { alignment, ..self }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        let resource = match config.capacity_bytes {
            Some(capacity) => Self::with_capacity(config.device_id, capacity),
            None => Self::new(config.device_id),
        };
        resource.with_alignment(config.alignment)
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Bytes currently held by live allocations, after rounding
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::SeqCst)
    }

    /// Number of live allocations
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    fn reserve(&self, bytes: u64) -> Result<()> {
        let capacity = self.capacity.unwrap_or(u64::MAX);
        self.used_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|&total| total <= capacity)
            })
            .map(|_| ())
            .map_err(|used| DeviceMemoryError::OutOfMemory {
                requested: bytes,
                available: capacity.saturating_sub(used),
            })
    }
}

impl MemoryResource for SimulatedDeviceResource {
    fn allocate(&self, bytes: u64) -> Result<DevicePtr> {
        if bytes == 0 {
            return Ok(DevicePtr::NULL);
        }

        let footprint = align_up(bytes, self.alignment);
        if let Err(e) = self.reserve(footprint) {
            tracing::warn!(
                device_id = self.device_id,
                bytes,
                "Device allocation failed: {}", e
            );
            return Err(e);
        }

        let stride = align_up(footprint, DEVICE_ADDRESS_ALIGNMENT.max(self.alignment));
        let addr = self.next_addr.fetch_add(stride, Ordering::SeqCst);
        self.live.insert(addr, bytes);

        tracing::trace!(device_id = self.device_id, bytes, addr, "allocate");
        Ok(DevicePtr::new(addr))
    }

    fn deallocate(&self, ptr: DevicePtr, bytes: u64) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }

        let (_, recorded) = self
            .live
            .remove(&ptr.addr())
            .ok_or(DeviceMemoryError::InvalidPointer { ptr })?;

        if recorded != bytes {
            tracing::warn!(
                device_id = self.device_id,
                %ptr,
                recorded,
                bytes,
                "Deallocation size does not match allocation size"
            );
        }
        self.used_bytes
            .fetch_sub(align_up(recorded, self.alignment), Ordering::SeqCst);

        tracing::trace!(device_id = self.device_id, bytes = recorded, %ptr, "deallocate");
        Ok(())
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Device
    }

    fn name(&self) -> &'static str {
        "simulated_device_resource"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_allocation() {
        let resource = SimulatedDeviceResource::new(0);

        let a = resource.allocate(1024).unwrap();
        let b = resource.allocate(1024).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.addr() % DEVICE_ADDRESS_ALIGNMENT, 0);
        assert_eq!(resource.used_bytes(), 2048);
        assert_eq!(resource.live_allocations(), 2);

        resource.deallocate(a, 1024).unwrap();
        resource.deallocate(b, 1024).unwrap();
        assert_eq!(resource.used_bytes(), 0);
        assert_eq!(resource.live_allocations(), 0);
    }

    #[test]
    fn test_zero_byte_allocation() {
        let resource = SimulatedDeviceResource::new(0);
        let ptr = resource.allocate(0).unwrap();
        assert!(ptr.is_null());
        assert!(resource.deallocate(ptr, 0).is_ok());
        assert_eq!(resource.live_allocations(), 0);
    }

    #[test]
    fn test_overallocation() {
        let resource = SimulatedDeviceResource::with_capacity(0, 4096);
        let _held = resource.allocate(3072).unwrap();

        match resource.allocate(2048) {
            Err(DeviceMemoryError::OutOfMemory { requested, available }) => {
                assert_eq!(requested, 2048);
                assert_eq!(available, 1024);
            }
            other => panic!("Expected OutOfMemory, got {:?}", other),
        }
        assert_eq!(resource.used_bytes(), 3072);
    }

    #[test]
    fn test_alignment_rounds_footprint() {
        let resource = SimulatedDeviceResource::with_capacity(0, 2048).with_alignment(512);

        let a = resource.allocate(10).unwrap();
        assert_eq!(a.addr() % 512, 0);
        assert_eq!(resource.used_bytes(), 512);

        let b = resource.allocate(1000).unwrap();
        assert_eq!(b.addr() - a.addr(), 512);
        assert_eq!(resource.used_bytes(), 1536);
        assert!(resource.allocate(513).is_err());

        resource.deallocate(a, 10).unwrap();
        resource.deallocate(b, 1000).unwrap();
        assert_eq!(resource.used_bytes(), 0);
    }

    #[test]
    fn test_unknown_pointer() {
        let resource = SimulatedDeviceResource::new(0);
        let result = resource.deallocate(DevicePtr::new(0x1000), 16);
        assert!(matches!(result, Err(DeviceMemoryError::InvalidPointer { .. })));
    }

    #[test]
    fn test_devices_use_disjoint_address_ranges() {
        let first = SimulatedDeviceResource::new(0);
        let second = SimulatedDeviceResource::new(1);
        assert_ne!(first.allocate(16).unwrap(), second.allocate(16).unwrap());
    }
}
