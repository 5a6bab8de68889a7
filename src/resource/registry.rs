//! The current-resource registry.
//!
//! A registry is a single slot that always holds exactly one resource. Every
//! read-modify-write happens under the slot's lock, so concurrent swappers can
//! never observe an empty or half-updated registry. Process-wide registries
//! exist per device id and are created on first use.

use std::sync::Arc;

use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::error::Result;
use super::{describe_chain, same_resource, SharedResource, SimulatedDeviceResource};

/// Device whose registry backs the free functions of this module
pub const DEFAULT_DEVICE_ID: usize = 0;

lazy_static! {
    static ref DEVICE_REGISTRIES: DashMap<usize, Arc<ResourceRegistry>> = DashMap::new();
}

/// Holds the current memory resource
#[derive(Debug)]
pub struct ResourceRegistry {
    device_id: usize,
    current: Mutex<SharedResource>,
}

/// Outcome of an atomic registry update
#[derive(Debug, Clone)]
pub struct Transition {
    /// Resource that was current when the update started
    pub previous: SharedResource,
    /// Resource that is current after the update
    pub current: SharedResource,
}

impl Transition {
    /// Whether the update installed a different resource
    pub fn changed(&self) -> bool {
        !same_resource(&self.previous, &self.current)
    }
}

impl ResourceRegistry {
    /// Create a registry for `device_id` holding `initial`
    pub fn new(device_id: usize, initial: SharedResource) -> Self {
        Self {
            device_id,
            current: Mutex::new(initial),
        }
    }

    /// Create a registry holding a fresh simulated device resource
    pub fn with_default_resource(device_id: usize) -> Self {
        Self::new(device_id, Arc::new(SimulatedDeviceResource::new(device_id)))
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// The presently active resource
    pub fn get_current_resource(&self) -> SharedResource {
        Arc::clone(&self.current.lock())
    }

    /// Install `resource` as current and return the resource it replaced
    pub fn set_current_resource(&self, resource: SharedResource) -> SharedResource {
        let mut current = self.current.lock();
        tracing::debug!(
            device_id = self.device_id,
            stack = %describe_chain(&resource),
            "Setting current memory resource"
        );
        std::mem::replace(&mut *current, resource)
    }

    /// Atomically inspect the current resource and optionally replace it.
    ///
    /// `f` runs with the registry locked and must not call back into this
    /// registry. Returning `Ok(None)` keeps the current resource; an error
    /// leaves the registry untouched and is returned unchanged.
    pub fn update<F>(&self, f: F) -> Result<Transition>
    where
        F: FnOnce(&SharedResource) -> Result<Option<SharedResource>>,
    {
        let mut current = self.current.lock();
        let previous = Arc::clone(&current);

        if let Some(next) = f(&previous)? {
            tracing::debug!(
                device_id = self.device_id,
                stack = %describe_chain(&next),
                "Replacing current memory resource"
            );
            *current = next;
        }

        Ok(Transition {
            previous,
            current: Arc::clone(&current),
        })
    }

    /// The adaptor chain of the current resource, outermost first
    pub fn stack(&self) -> Vec<SharedResource> {
        let top = self.get_current_resource();
        let mut chain = vec![Arc::clone(&top)];
        let mut next = top.upstream().cloned();
        while let Some(resource) = next {
            next = resource.upstream().cloned();
            chain.push(resource);
        }
        chain
    }

    /// Human-readable form of [`ResourceRegistry::stack`]
    pub fn describe_stack(&self) -> String {
        describe_chain(&self.get_current_resource())
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::with_default_resource(DEFAULT_DEVICE_ID)
    }
}

/// The process-wide registry of `device_id`
pub fn for_device(device_id: usize) -> Arc<ResourceRegistry> {
    let entry = DEVICE_REGISTRIES
        .entry(device_id)
        .or_insert_with(|| Arc::new(ResourceRegistry::with_default_resource(device_id)));
    Arc::clone(entry.value())
}

/// The process-wide registry of the default device
pub fn global() -> Arc<ResourceRegistry> {
    for_device(DEFAULT_DEVICE_ID)
}

/// Current resource of the default device
pub fn get_current_device_resource() -> SharedResource {
    global().get_current_resource()
}

/// Install `resource` as current for the default device, returning the
/// replaced resource
pub fn set_current_device_resource(resource: SharedResource) -> SharedResource {
    global().set_current_resource(resource)
}
