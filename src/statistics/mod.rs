//! Attaching and detaching allocation statistics.
//!
//! Statistics are gathered by pushing a [`StatisticsResourceAdaptor`] on top
//! of a registry's current resource. The adaptor must stay the topmost
//! resource while statistics are gathered; [`StatisticsScope`] checks this on
//! exit and restores the resource that was current before it was entered.

mod scope;

use std::sync::Arc;

use crate::error::{DeviceMemoryError, Result};
use crate::metrics::Statistics;
use crate::resource::{
    as_statistics_adaptor, describe_chain, is_statistics_resource, registry, ResourceRegistry,
    SharedResource, StatisticsResourceAdaptor, Transition,
};

pub use scope::{statistics, with_statistics, StatisticsScope};

/// Enable statistics on the default device's registry.
///
/// Idempotent: if the current resource already is a statistics adaptor
/// nothing changes. Returns the adaptor that is current afterwards.
pub fn enable_statistics() -> Result<SharedResource> {
    enable_statistics_in(&registry::global())
}

/// Enable statistics on `registry`, see [`enable_statistics`]
pub fn enable_statistics_in(registry: &ResourceRegistry) -> Result<SharedResource> {
    enable_statistics_with(registry, |upstream| Ok(StatisticsResourceAdaptor::shared(upstream)))
}

/// Enable statistics on `registry` using `make_adaptor` to wrap the current
/// resource.
///
/// If `make_adaptor` fails the registry is left unchanged and the error is
/// returned as is.
pub fn enable_statistics_with<F>(registry: &ResourceRegistry, make_adaptor: F) -> Result<SharedResource>
where
    F: FnOnce(SharedResource) -> Result<SharedResource>,
{
    Ok(wrap_current(registry, make_adaptor)?.current)
}

pub(crate) fn wrap_current<F>(registry: &ResourceRegistry, make_adaptor: F) -> Result<Transition>
where
    F: FnOnce(SharedResource) -> Result<SharedResource>,
{
    let transition = registry.update(|current| {
        if is_statistics_resource(current) {
            return Ok(None);
        }

        let adaptor = make_adaptor(Arc::clone(current))?;
        if !is_statistics_resource(&adaptor) {
            return Err(DeviceMemoryError::AdaptorConstruction {
                message: format!("expected a statistics adaptor, got a {} resource", adaptor.kind()),
            });
        }
        Ok(Some(adaptor))
    })?;

    if transition.changed() {
        tracing::info!(
            device_id = registry.device_id(),
            stack = %describe_chain(&transition.current),
            "Allocation statistics enabled"
        );
    }
    Ok(transition)
}

/// Statistics of the default device, `None` when statistics are disabled
pub fn get_statistics() -> Option<Statistics> {
    get_statistics_in(&registry::global())
}

pub fn get_statistics_in(registry: &ResourceRegistry) -> Option<Statistics> {
    let current = registry.get_current_resource();
    as_statistics_adaptor(&current).map(|adaptor| adaptor.allocation_counts())
}

/// Open a nested counter block on the default device's statistics adaptor.
///
/// Returns the statistics of the enclosing block, or `None` when statistics
/// are disabled.
pub fn push_statistics() -> Option<Statistics> {
    push_statistics_in(&registry::global())
}

pub fn push_statistics_in(registry: &ResourceRegistry) -> Option<Statistics> {
    let current = registry.get_current_resource();
    as_statistics_adaptor(&current).map(|adaptor| adaptor.push_counters())
}

/// Close the innermost counter block on the default device's statistics
/// adaptor and return its statistics.
///
/// Returns `Ok(None)` when statistics are disabled and `CounterUnderflow`
/// when there is no block left to close.
pub fn pop_statistics() -> Result<Option<Statistics>> {
    pop_statistics_in(&registry::global())
}

pub fn pop_statistics_in(registry: &ResourceRegistry) -> Result<Option<Statistics>> {
    let current = registry.get_current_resource();
    as_statistics_adaptor(&current)
        .map(|adaptor| adaptor.pop_counters())
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{same_resource, SimulatedDeviceResource};
    use crate::types::ResourceKind;
    use pretty_assertions::assert_eq;

    fn registry() -> (ResourceRegistry, SharedResource) {
        let base: SharedResource = Arc::new(SimulatedDeviceResource::new(0));
        (ResourceRegistry::new(0, Arc::clone(&base)), base)
    }

    #[test]
    fn test_enable_wraps_current_resource() {
        let (registry, base) = registry();

        let adaptor = enable_statistics_in(&registry).unwrap();
        let current = registry.get_current_resource();

        assert!(same_resource(&adaptor, &current));
        assert_eq!(current.kind(), ResourceKind::Statistics);
        let upstream = current.upstream().unwrap();
        assert!(same_resource(upstream, &base));
    }

    #[test]
    fn test_enable_is_idempotent() {
        let (registry, _) = registry();

        let first = enable_statistics_in(&registry).unwrap();
        let second = enable_statistics_in(&registry).unwrap();

        assert!(same_resource(&first, &second));
        assert_eq!(registry.stack().len(), 2);
    }

    #[test]
    fn test_concurrent_enable_installs_one_adaptor() {
        let (registry, base) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| enable_statistics_in(&registry).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let installed: Vec<SharedResource> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        let current = registry.get_current_resource();
        assert!(installed.iter().all(|adaptor| same_resource(adaptor, &current)));
        assert_eq!(registry.stack().len(), 2);
        assert!(same_resource(current.upstream().unwrap(), &base));
    }

    #[test]
    fn test_enable_keeps_existing_adaptor() {
        let (registry, base) = registry();
        let existing = StatisticsResourceAdaptor::shared(base);
        registry.set_current_resource(Arc::clone(&existing));

        let current = enable_statistics_in(&registry).unwrap();
        assert!(same_resource(&current, &existing));
    }

    #[test]
    fn test_failed_construction_leaves_registry_unchanged() {
        let (registry, base) = registry();

        let result = enable_statistics_with(&registry, |_| {
            Err(DeviceMemoryError::AdaptorConstruction {
                message: "out of host memory".to_string(),
            })
        });

        match result {
            Err(DeviceMemoryError::AdaptorConstruction { message }) => {
                assert_eq!(message, "out of host memory");
            }
            other => panic!("Expected AdaptorConstruction, got {:?}", other),
        }
        assert!(same_resource(&registry.get_current_resource(), &base));
    }

    #[test]
    fn test_factory_must_produce_statistics_adaptor() {
        let (registry, base) = registry();

        let result = enable_statistics_with(&registry, |_| {
            Ok(Arc::new(SimulatedDeviceResource::new(0)) as SharedResource)
        });

        assert!(matches!(result, Err(DeviceMemoryError::AdaptorConstruction { .. })));
        assert!(same_resource(&registry.get_current_resource(), &base));
    }

    #[test]
    fn test_statistics_disabled() {
        let (registry, _) = registry();

        assert_eq!(get_statistics_in(&registry), None);
        assert_eq!(push_statistics_in(&registry), None);
        assert_eq!(pop_statistics_in(&registry).unwrap(), None);
        assert_eq!(get_statistics_in(&registry), None);
    }

    #[test]
    fn test_current_statistics() {
        let (registry, _) = registry();
        let adaptor = enable_statistics_in(&registry).unwrap();

        let b1 = adaptor.allocate(16).unwrap();
        assert_eq!(
            get_statistics_in(&registry),
            Some(Statistics {
                current_bytes: 16,
                current_count: 1,
                peak_bytes: 16,
                peak_count: 1,
                total_bytes: 16,
                total_count: 1,
            })
        );

        let b2 = adaptor.allocate(32).unwrap();
        assert_eq!(
            push_statistics_in(&registry),
            Some(Statistics {
                current_bytes: 48,
                current_count: 2,
                peak_bytes: 48,
                peak_count: 2,
                total_bytes: 48,
                total_count: 2,
            })
        );

        adaptor.deallocate(b1, 16).unwrap();
        assert_eq!(
            pop_statistics_in(&registry).unwrap(),
            Some(Statistics {
                current_bytes: -16,
                current_count: -1,
                peak_bytes: 0,
                peak_count: 0,
                total_bytes: 0,
                total_count: 0,
            })
        );

        adaptor.deallocate(b2, 32).unwrap();
        assert_eq!(
            get_statistics_in(&registry),
            Some(Statistics {
                current_bytes: 0,
                current_count: 0,
                peak_bytes: 48,
                peak_count: 2,
                total_bytes: 48,
                total_count: 2,
            })
        );
    }

    #[test]
    fn test_pop_without_push_fails() {
        let (registry, _) = registry();
        enable_statistics_in(&registry).unwrap();

        let err = pop_statistics_in(&registry).unwrap_err();
        assert!(matches!(err, DeviceMemoryError::CounterUnderflow));
    }
}
