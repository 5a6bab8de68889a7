//! Memory resources, resource adaptors and the current-resource registry

mod device;
mod statistics;
pub mod registry;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{DevicePtr, ResourceKind};

pub use device::SimulatedDeviceResource;
pub use registry::{
    get_current_device_resource, set_current_device_resource, ResourceRegistry, Transition,
};
pub use statistics::StatisticsResourceAdaptor;

/// A resource shared between the registry, adaptors and live buffers
pub type SharedResource = Arc<dyn MemoryResource>;

/// Capability to allocate and free device memory.
///
/// Adaptors implement this trait too and report the single resource they
/// wrap through [`MemoryResource::upstream`].
pub trait MemoryResource: Send + Sync + fmt::Debug {
    /// Allocate at least `bytes` bytes
    fn allocate(&self, bytes: u64) -> Result<DevicePtr>;

    /// Free an allocation of `bytes` bytes previously returned by `allocate`
    fn deallocate(&self, ptr: DevicePtr, bytes: u64) -> Result<()>;

    /// Tag used for runtime kind checks
    fn kind(&self) -> ResourceKind;

    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// The resource this adaptor forwards to, `None` for leaf resources
    fn upstream(&self) -> Option<&SharedResource> {
        None
    }

    /// Typed access to the concrete resource
    fn as_any(&self) -> &dyn Any;
}

/// Whether two handles refer to the same resource instance
pub fn same_resource(a: &SharedResource, b: &SharedResource) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Whether `resource` is a statistics adaptor
pub fn is_statistics_resource(resource: &SharedResource) -> bool {
    resource.kind() == ResourceKind::Statistics
}

/// Borrow `resource` as a statistics adaptor if it is one
pub fn as_statistics_adaptor(resource: &SharedResource) -> Option<&StatisticsResourceAdaptor> {
    if !is_statistics_resource(resource) {
        return None;
    }
    resource.as_any().downcast_ref::<StatisticsResourceAdaptor>()
}

/// Render the adaptor chain starting at `top`, outermost first
pub fn describe_chain(top: &SharedResource) -> String {
    let mut names = vec![top.name()];
    let mut current = top.upstream();
    while let Some(next) = current {
        names.push(next.name());
        current = next.upstream();
    }
    names.join(" -> ")
}
