use async_trait::async_trait;

use crate::domain::errors::Result;

/// Port for the GPIO pin primitives used by relay-backed devices
#[async_trait]
pub trait GpioPort: Send + Sync {
    async fn write(&self, pin: u32, value: bool) -> Result<()>;

    async fn read(&self, pin: u32) -> Result<bool>;
}
