use std::sync::Arc;

use async_trait::async_trait;

use crate::application::services::CameraStream;
use crate::domain::errors::Result;
use crate::domain::ports::DeviceDriver;
use crate::domain::value_objects::DeviceStatus;

/// Exposes a camera stream as a switchable device: on while Starting or Running
pub struct CameraDevice {
    stream: Arc<CameraStream>,
}

impl CameraDevice {
    pub fn new(stream: Arc<CameraStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl DeviceDriver for CameraDevice {
    async fn read_state(&self) -> Result<DeviceStatus> {
        let status = self.stream.status();
        Ok(DeviceStatus {
            state: status.state.is_on(),
            on_since: status.started_at,
            mac: None,
            stream: Some(status.state),
        })
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        if on {
            self.stream.start().await
        } else {
            self.stream.stop().await;
            Ok(())
        }
    }
}
