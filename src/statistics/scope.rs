use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{DeviceMemoryError, Result};
use crate::metrics::Statistics;
use crate::resource::{
    as_statistics_adaptor, describe_chain, registry, same_resource, ResourceRegistry,
    SharedResource, StatisticsResourceAdaptor,
};
use super::wrap_current;

/// Guard that keeps statistics enabled while it is alive.
///
/// Entering captures the current resource, enables statistics and records
/// the adaptor that is current afterwards. If statistics were already active
/// the existing adaptor is reused and a nested counter block is opened on it,
/// so the scope reports only its own traffic.
///
/// Leaving the scope, by [`StatisticsScope::exit`] or by dropping the guard,
/// always restores the resource that was current on entry. If the current
/// resource is no longer the one recorded on entry, the resource stack was
/// changed while the scope was active. `exit` reports this as
/// [`DeviceMemoryError::StackChanged`]; a dropped guard panics with the same
/// message, or logs it when the thread is already unwinding.
#[must_use = "statistics are disabled again when the scope is dropped"]
#[derive(Debug)]
pub struct StatisticsScope {
    registry: Arc<ResourceRegistry>,
    prior: SharedResource,
    entered: SharedResource,
    nested: bool,
    closed: bool,
}

impl StatisticsScope {
    /// Enable statistics on `registry` until the returned guard is closed
    pub fn enter(registry: Arc<ResourceRegistry>) -> Result<Self> {
        let transition = wrap_current(&registry, |upstream| {
            Ok(StatisticsResourceAdaptor::shared(upstream))
        })?;

        // Statistics were already active: count this scope separately
        let nested = !transition.changed();
        if nested {
            if let Some(adaptor) = as_statistics_adaptor(&transition.current) {
                adaptor.push_counters();
            }
        }

        tracing::debug!(
            device_id = registry.device_id(),
            nested,
            "Entered statistics scope"
        );

        Ok(Self {
            registry,
            prior: transition.previous,
            entered: transition.current,
            nested,
            closed: false,
        })
    }

    /// Resource that was current before the scope was entered
    pub fn prior(&self) -> &SharedResource {
        &self.prior
    }

    /// Statistics adaptor installed (or reused) on entry
    pub fn entered(&self) -> &SharedResource {
        &self.entered
    }

    /// Statistics gathered since the scope was entered
    pub fn statistics(&self) -> Option<Statistics> {
        as_statistics_adaptor(&self.entered).map(|adaptor| adaptor.allocation_counts())
    }

    /// Close the scope, restoring the prior resource.
    ///
    /// The prior resource is restored even when `StackChanged` is returned.
    pub fn exit(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;

        let popped = if self.nested {
            as_statistics_adaptor(&self.entered).map(|adaptor| adaptor.pop_counters())
        } else {
            None
        };

        let observed = self.registry.set_current_resource(Arc::clone(&self.prior));
        if !same_resource(&observed, &self.entered) {
            let error = DeviceMemoryError::StackChanged {
                entered: describe_chain(&self.entered),
                observed: describe_chain(&observed),
            };
            tracing::warn!(
                device_id = self.registry.device_id(),
                error = %error,
                "Restored prior memory resource after stack violation"
            );
            return Err(error);
        }

        tracing::debug!(device_id = self.registry.device_id(), "Left statistics scope");
        match popped {
            Some(Err(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for StatisticsScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.close() {
            if std::thread::panicking() {
                tracing::error!(error = %e, "Statistics scope closed while unwinding");
            } else {
                panic!("{}", e);
            }
        }
    }
}

/// Enable statistics on the default device until the guard is closed
pub fn statistics() -> Result<StatisticsScope> {
    StatisticsScope::enter(registry::global())
}

/// Run `body` inside a statistics scope on `registry`.
///
/// A stack violation detected on exit takes precedence over an error
/// returned by `body` and over a panic in `body`. The prior resource is
/// restored on every path; a panic without a violation is resumed after
/// restoring.
pub fn with_statistics<T, F>(registry: Arc<ResourceRegistry>, body: F) -> Result<T>
where
    F: FnOnce(&StatisticsScope) -> Result<T>,
{
    let scope = StatisticsScope::enter(registry)?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&scope)));
    scope.exit()?;

    match outcome {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}
