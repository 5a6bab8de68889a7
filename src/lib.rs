//! devmem - device memory resources with composable statistics adaptors
//!
//! Every device has a registry holding its current memory resource. Resources
//! can be wrapped by adaptors; the statistics adaptor counts the bytes and
//! allocations that pass through it. The [`statistics`] module attaches that
//! adaptor to the top of a registry, either permanently
//! ([`enable_statistics`]) or for the lifetime of a guard
//! ([`statistics::statistics`]).
//!
//! ```no_run
//! use devmem::{statistics, DeviceBuffer};
//!
//! # fn main() -> devmem::Result<()> {
//! let scope = statistics::statistics()?;
//! let buffer = DeviceBuffer::new(1000)?;
//! println!("{:?}", scope.statistics());
//! drop(buffer);
//! scope.exit()?;
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod buffer;
pub mod config;
pub mod error;
pub mod metrics;
pub mod resource;
pub mod statistics;
pub mod types;
pub mod utils;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for public API
pub use buffer::DeviceBuffer;
pub use config::MemoryConfig;
pub use error::{DeviceMemoryError, Result};
pub use metrics::Statistics;
pub use resource::{
    get_current_device_resource, set_current_device_resource, MemoryResource, ResourceRegistry,
    SharedResource, SimulatedDeviceResource, StatisticsResourceAdaptor,
};
pub use statistics::{enable_statistics, get_statistics, pop_statistics, push_statistics, StatisticsScope};
pub use types::{DevicePtr, ResourceKind};
