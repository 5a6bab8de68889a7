//! Logging setup and memory profiling utilities

mod logging;
mod profiler;

pub use logging::{setup_logging, LogConfig};
pub use profiler::{OrderBy, ProfileData, ProfilerGuard, ProfilerRecords};

/// Returns the process-wide profiler records
pub fn default_profiler_records() -> std::sync::Arc<ProfilerRecords> {
    ProfilerRecords::global()
}
