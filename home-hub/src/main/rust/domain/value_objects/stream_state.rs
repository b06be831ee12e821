use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Decoder stream states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No decoder process
    Idle,
    /// Decoder is being spawned
    Starting,
    /// Decoder is alive and producing frames
    Running,
    /// Decoder failed to spawn or exited abnormally
    Error,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Starting => write!(f, "STARTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl StreamState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Starting => 1.0,
            Self::Running => 2.0,
            Self::Error => 3.0,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the camera counts as switched on from a device point of view
    pub fn is_on(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Snapshot of a stream's state published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub state: StreamState,
    pub started_at: Option<DateTime<Utc>>,
}
