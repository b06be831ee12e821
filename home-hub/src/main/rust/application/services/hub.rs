use std::collections::BTreeMap;
use std::sync::Arc;

use super::broadcaster::Broadcaster;
use super::camera_stream::CameraStream;
use super::device_registry::DeviceRegistry;
use super::trigger_engine::TriggerEngine;
use crate::domain::errors::Result;
use crate::domain::value_objects::{DeviceId, DeviceKind, DeviceStatus};

/// A camera's stream together with its viewer fan-out
#[derive(Clone)]
pub struct CameraChannel {
    stream: Arc<CameraStream>,
    broadcaster: Arc<Broadcaster>,
}

impl CameraChannel {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            stream: Arc::clone(broadcaster.stream()),
            broadcaster,
        }
    }

    pub fn stream(&self) -> &Arc<CameraStream> {
        &self.stream
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}

/// Entry point for the HTTP layer: device state, switching and camera channels
pub struct Hub {
    engine: Arc<TriggerEngine>,
    cameras: BTreeMap<String, CameraChannel>,
}

impl Hub {
    pub fn new(engine: Arc<TriggerEngine>, cameras: BTreeMap<String, CameraChannel>) -> Self {
        Self { engine, cameras }
    }

    pub fn engine(&self) -> &Arc<TriggerEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        self.engine.registry()
    }

    pub fn camera(&self, id: &str) -> Option<&CameraChannel> {
        self.cameras.get(id)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &CameraChannel> {
        self.cameras.values()
    }

    pub async fn status(&self, id: &DeviceId) -> Result<DeviceStatus> {
        self.registry().read(id).await
    }

    /// Status of every device of `kind` in id order. Unreadable devices are `None`.
    pub async fn list(&self, kind: DeviceKind) -> Vec<Option<DeviceStatus>> {
        let mut statuses = Vec::new();
        for device in self.registry().of_kind(kind) {
            let status = match self.registry().read(device.id()).await {
                Ok(status) => Some(status),
                Err(err) => {
                    tracing::warn!(device = %device.id(), error = %err, "Failed to read device state");
                    None
                }
            };
            statuses.push(status);
        }
        statuses
    }

    /// Switch a device, run its triggers and return its fresh status
    pub async fn set(&self, id: &DeviceId, on: bool) -> Result<DeviceStatus> {
        self.engine.set(id, on).await?;
        self.status(id).await
    }

    /// Stop every camera decoder
    pub async fn shutdown(&self) {
        for channel in self.cameras.values() {
            channel.stream.stop().await;
        }
    }
}
