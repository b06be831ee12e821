use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::StreamState;
use crate::domain::errors::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Psu,
    Light,
    Camera,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Psu => "psu",
            DeviceKind::Light => "light",
            DeviceKind::Camera => "camera",
        }
    }

    /// Label used in lifecycle log lines
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Psu => "PSU",
            DeviceKind::Light => "Light",
            DeviceKind::Camera => "Camera",
        }
    }
}

impl FromStr for DeviceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "psu" => Ok(DeviceKind::Psu),
            "light" => Ok(DeviceKind::Light),
            "camera" => Ok(DeviceKind::Camera),
            other => Err(DomainError::UnknownDeviceKind(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed device identity: kind plus the id it is configured under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    kind: DeviceKind,
    id: String,
}

impl DeviceId {
    pub fn new(kind: DeviceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn psu(id: impl Into<String>) -> Self {
        Self::new(DeviceKind::Psu, id)
    }

    pub fn light(id: impl Into<String>) -> Self {
        Self::new(DeviceKind::Light, id)
    }

    pub fn camera(id: impl Into<String>) -> Self {
        Self::new(DeviceKind::Camera, id)
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Observed state of a device as reported over HTTP
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub state: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamState>,
}

impl DeviceStatus {
    pub fn switched(state: bool) -> Self {
        Self {
            state,
            on_since: None,
            mac: None,
            stream: None,
        }
    }
}
