use thiserror::Error;

use crate::types::DevicePtr;

// Add Result type alias
pub type Result<T> = std::result::Result<T, DeviceMemoryError>;

/// Errors raised by memory resources, the resource registry and the
/// statistics controller.
#[derive(Debug, Error)]
pub enum DeviceMemoryError {
    /// The current resource was replaced while a statistics scope was active.
    #[error("memory resource stack was changed while in the context (entered with {entered}, found {observed})")]
    StackChanged {
        entered: String,
        observed: String,
    },

    #[error("out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory {
        requested: u64,
        available: u64,
    },

    #[error("pointer {ptr} was not allocated by this resource")]
    InvalidPointer {
        ptr: DevicePtr,
    },

    #[error("cannot pop the last counter pair")]
    CounterUnderflow,

    #[error("failed to construct resource adaptor: {message}")]
    AdaptorConstruction {
        message: String,
    },

    #[error("Configuration error for {parameter}: {message}")]
    ConfigurationError {
        message: String,
        parameter: String,
    },

    #[error("Logging error: {message}")]
    LoggingError {
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Extension trait for error handling utilities
pub trait ErrorExt {
    /// Whether the error reports a broken caller obligation rather than a
    /// resource failure.
    fn is_contract_violation(&self) -> bool;

    /// Whether retrying with a smaller request could succeed.
    fn is_allocation_failure(&self) -> bool;
}

impl ErrorExt for DeviceMemoryError {
    fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            DeviceMemoryError::StackChanged { .. } | DeviceMemoryError::CounterUnderflow
        )
    }

    fn is_allocation_failure(&self) -> bool {
        matches!(self, DeviceMemoryError::OutOfMemory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DeviceMemoryError::OutOfMemory {
            requested: 1024,
            available: 512,
        };
        assert_eq!(
            error.to_string(),
            "out of memory: requested 1024 bytes, 512 bytes available"
        );

        assert_eq!(
            DeviceMemoryError::CounterUnderflow.to_string(),
            "cannot pop the last counter pair"
        );
    }

    #[test]
    fn test_stack_changed_message() {
        let error = DeviceMemoryError::StackChanged {
            entered: "statistics_resource_adaptor".to_string(),
            observed: "simulated_device_resource".to_string(),
        };
        assert!(error
            .to_string()
            .starts_with("memory resource stack was changed while in the context"));
    }

    #[test]
    fn test_error_classification() {
        let error = DeviceMemoryError::StackChanged {
            entered: String::new(),
            observed: String::new(),
        };
        assert!(error.is_contract_violation());
        assert!(!error.is_allocation_failure());

        let error = DeviceMemoryError::OutOfMemory {
            requested: 1,
            available: 0,
        };
        assert!(error.is_allocation_failure());
        assert!(!error.is_contract_violation());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let error: DeviceMemoryError = parse.unwrap_err().into();
        assert!(matches!(error, DeviceMemoryError::Serialization(_)));
    }
}
