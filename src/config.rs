use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceMemoryError, Result};
use crate::resource::{registry, ResourceRegistry, SharedResource, SimulatedDeviceResource};
use crate::types::ALLOCATION_ALIGNMENT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub device: DeviceConfig,
    pub statistics: StatisticsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device whose registry is initialized
    pub device_id: usize,

    /// Maximum bytes the device resource hands out (None for unbounded)
    pub capacity_bytes: Option<u64>,

    /// Allocation granularity in bytes (power of two)
    pub alignment: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Push a statistics adaptor when the registry is initialized
    pub enable_on_init: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,

    /// Write logs to this file instead of stdout
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: registry::DEFAULT_DEVICE_ID,
            capacity_bytes: None,
            alignment: ALLOCATION_ALIGNMENT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_file: None,
        }
    }
}

impl MemoryConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.device.alignment.is_power_of_two() {
            return Err(DeviceMemoryError::ConfigurationError {
                message: format!(
                    "Alignment must be a non-zero power of two, got {}",
                    self.device.alignment
                ),
                parameter: "alignment".to_string(),
            });
        }

        if self.device.capacity_bytes == Some(0) {
            return Err(DeviceMemoryError::ConfigurationError {
                message: "Capacity cannot be zero when specified".to_string(),
                parameter: "capacity_bytes".to_string(),
            });
        }

        Ok(())
    }

    /// Build the default resource for the configured device
    pub fn build_resource(&self) -> SharedResource {
        Arc::new(SimulatedDeviceResource::from_config(&self.device))
    }

    /// Build a standalone registry from this configuration
    pub fn build_registry(&self) -> Result<ResourceRegistry> {
        self.validate()?;
        let registry = ResourceRegistry::new(self.device.device_id, self.build_resource());
        if self.statistics.enable_on_init {
            crate::statistics::enable_statistics_in(&registry)?;
        }
        Ok(registry)
    }
}

/// Install the configured resource in the process-wide registry of the
/// configured device and return that registry
pub fn init(config: &MemoryConfig) -> Result<Arc<ResourceRegistry>> {
    config.validate()?;

    let registry = registry::for_device(config.device.device_id);
    registry.set_current_resource(config.build_resource());
    if config.statistics.enable_on_init {
        crate::statistics::enable_statistics_in(&registry)?;
    }

    tracing::info!(
        device_id = config.device.device_id,
        capacity_bytes = ?config.device.capacity_bytes,
        alignment = config.device.alignment,
        stack = %registry.describe_stack(),
        "Initialized device memory registry"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DeviceBuffer;
    use crate::resource::is_statistics_resource;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.device.device_id, 0);
        assert!(!config.statistics.enable_on_init);
        assert_eq!(config.device.alignment, 16);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MemoryConfig::default();
        config.device.capacity_bytes = Some(0);
        match config.validate() {
            Err(DeviceMemoryError::ConfigurationError { parameter, .. }) => {
                assert_eq!(parameter, "capacity_bytes");
            }
            other => panic!("Expected ConfigurationError, got {:?}", other),
        }

        for alignment in [0, 24] {
            let mut config = MemoryConfig::default();
            config.device.alignment = alignment;
            match config.validate() {
                Err(DeviceMemoryError::ConfigurationError { parameter, .. }) => {
                    assert_eq!(parameter, "alignment");
                }
                other => panic!("Expected ConfigurationError, got {:?}", other),
            }
        }

        let result = MemoryConfig::from_json_str(r#"{"device": {"alignment": 0}}"#);
        assert!(matches!(result, Err(DeviceMemoryError::ConfigurationError { .. })));
    }

    #[test]
    fn test_partial_json() {
        let config = MemoryConfig::from_json_str(
            r#"{"device": {"capacity_bytes": 1048576}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        assert_eq!(config.device.capacity_bytes, Some(1 << 20));
        assert_eq!(config.device.device_id, 0);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"device": {{"device_id": 3}}, "statistics": {{"enable_on_init": true}}}}"#).unwrap();

        let config = MemoryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.device.device_id, 3);
        assert!(config.statistics.enable_on_init);
    }

    #[test]
    fn test_build_registry() {
        let mut config = MemoryConfig::default();
        config.statistics.enable_on_init = true;

        let registry = config.build_registry().unwrap();
        assert!(is_statistics_resource(&registry.get_current_resource()));
        assert_eq!(registry.stack().len(), 2);
    }

    #[test]
    fn test_alignment_reaches_device_resource() {
        let config = MemoryConfig::from_json_str(r#"{"device": {"alignment": 256}}"#).unwrap();
        let registry = config.build_registry().unwrap();

        let buffer = DeviceBuffer::new_in(&registry, 10).unwrap();
        let current = registry.get_current_resource();
        let device = current
            .as_any()
            .downcast_ref::<SimulatedDeviceResource>()
            .unwrap();
        assert_eq!(device.alignment(), 256);
        assert_eq!(device.used_bytes(), 256);

        drop(buffer);
        assert_eq!(device.used_bytes(), 0);
    }

    #[test]
    fn test_init_device_registry() {
        let mut config = MemoryConfig::default();
        config.device.device_id = 11;
        config.device.capacity_bytes = Some(4096);

        let registry = init(&config).unwrap();
        assert!(Arc::ptr_eq(&registry, &registry::for_device(11)));
        assert!(registry.get_current_resource().allocate(8192).is_err());
    }
}
