use std::sync::Arc;

use crate::error::Result;
use crate::resource::{registry, ResourceRegistry, SharedResource};
use crate::types::{align_up, DevicePtr, ALLOCATION_ALIGNMENT};

/// Owned, untyped device memory allocation.
///
/// The buffer remembers the resource it was allocated from and returns the
/// memory to that resource when dropped, even if the registry has moved on to
/// a different resource in the meantime.
#[derive(Debug)]
pub struct DeviceBuffer {
    ptr: DevicePtr,
    size: u64,
    capacity: u64,
    resource: SharedResource,
}

impl DeviceBuffer {
    /// Allocate `size` bytes from the default device's current resource
    pub fn new(size: u64) -> Result<Self> {
        Self::new_in(&registry::global(), size)
    }

    /// Allocate `size` bytes from the current resource of `registry`
    pub fn new_in(registry: &ResourceRegistry, size: u64) -> Result<Self> {
        Self::with_resource(size, registry.get_current_resource())
    }

    /// Allocate `size` bytes from `resource`
    pub fn with_resource(size: u64, resource: SharedResource) -> Result<Self> {
        let capacity = align_up(size, ALLOCATION_ALIGNMENT);
        let ptr = resource.allocate(capacity)?;

        Ok(Self {
            ptr,
            size,
            capacity,
            resource,
        })
    }

    /// Device address of the allocation, null for empty buffers
    pub fn data(&self) -> DevicePtr {
        self.ptr
    }

    /// Requested size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes actually requested from the resource
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Resource the buffer was allocated from
    pub fn memory_resource(&self) -> &SharedResource {
        &self.resource
    }

    /// Allocate a buffer of the same size from the same resource.
    ///
    /// Device memory contents are not modelled, so nothing is copied.
    pub fn try_clone(&self) -> Result<Self> {
        Self::with_resource(self.size, Arc::clone(&self.resource))
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.resource.deallocate(self.ptr, self.capacity) {
            tracing::error!(
                ptr = %self.ptr,
                bytes = self.capacity,
                resource = self.resource.name(),
                "Failed to release device buffer: {}", e
            );
        }
    }
}
