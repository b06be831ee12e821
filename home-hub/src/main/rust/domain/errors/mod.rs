use thiserror::Error;

use crate::domain::value_objects::DeviceId;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Failed to spawn decoder for camera {camera}: {reason}")]
    ProcessSpawnFailure { camera: String, reason: String },

    #[error("Decoder for camera {camera} exited abnormally ({code:?})")]
    ProcessAbnormalExit { camera: String, code: Option<i32> },

    #[error("Device I/O failed: {0}")]
    DeviceIo(String),

    #[error("Smart plug protocol error: {0}")]
    Protocol(String),

    #[error("Trigger '{trigger}' failed: {reason}")]
    TriggerFailure { trigger: String, reason: String },

    #[error("Trigger cycle: {0} was already switched in this cascade")]
    TriggerCycle(DeviceId),

    #[error("Invalid trigger '{0}': expected kind:id[:invert]")]
    InvalidTrigger(String),

    #[error("Unknown device kind: {0}")]
    UnknownDeviceKind(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("Invalid device config for {device}: {reason}")]
    InvalidDeviceConfig { device: String, reason: String },

    #[error("Invalid retry multiplier: must be at least 1.0")]
    InvalidRetryMultiplier,
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::DeviceIo(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
