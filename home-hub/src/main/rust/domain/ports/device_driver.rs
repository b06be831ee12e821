use async_trait::async_trait;

use crate::domain::errors::Result;
use crate::domain::value_objects::DeviceStatus;

/// Port for reading and switching one physical or virtual device
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Read the device's currently observed state
    async fn read_state(&self) -> Result<DeviceStatus>;

    /// Switch the device on or off
    async fn set_state(&self, on: bool) -> Result<()>;
}
