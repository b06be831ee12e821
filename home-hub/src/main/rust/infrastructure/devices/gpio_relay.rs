use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::errors::Result;
use crate::domain::ports::{DeviceDriver, GpioPort};
use crate::domain::value_objects::DeviceStatus;

/// A PSU or light switched by a single GPIO pin.
///
/// Some relay boards reset the pin when its value is read back, so the last written
/// value is reported once known and the pin is only read before the first write.
pub struct GpioRelay {
    gpio: Arc<dyn GpioPort>,
    pin: u32,
    last_written: Mutex<Option<bool>>,
}

impl GpioRelay {
    pub fn new(gpio: Arc<dyn GpioPort>, pin: u32) -> Self {
        Self {
            gpio,
            pin,
            last_written: Mutex::new(None),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

#[async_trait]
impl DeviceDriver for GpioRelay {
    async fn read_state(&self) -> Result<DeviceStatus> {
        let cached = *self.last_written.lock();
        let state = match cached {
            Some(state) => state,
            None => self.gpio.read(self.pin).await?,
        };
        Ok(DeviceStatus::switched(state))
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        self.gpio.write(self.pin, on).await?;
        *self.last_written.lock() = Some(on);
        Ok(())
    }
}
