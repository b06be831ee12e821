use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::GpioPort;

/// GPIO through the sysfs interface (`/sys/class/gpio` by default)
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    async fn export(&self, pin: u32) -> Result<()> {
        let pin_dir = self.pin_dir(pin);
        if tokio::fs::try_exists(&pin_dir).await? {
            return Ok(());
        }
        tracing::debug!(pin, "Exporting GPIO pin");
        tokio::fs::write(self.root.join("export"), pin.to_string())
            .await
            .map_err(|e| io_error("export", pin, e))
    }
}

fn io_error(action: &str, pin: u32, err: std::io::Error) -> DomainError {
    DomainError::DeviceIo(format!("GPIO {} {}: {}", pin, action, err))
}

#[async_trait]
impl GpioPort for SysfsGpio {
    async fn write(&self, pin: u32, value: bool) -> Result<()> {
        self.export(pin).await?;

        let pin_dir = self.pin_dir(pin);
        let direction = pin_dir.join("direction");
        let current = tokio::fs::read_to_string(&direction).await.unwrap_or_default();
        if current.trim() != "out" {
            tokio::fs::write(&direction, "out")
                .await
                .map_err(|e| io_error("direction", pin, e))?;
        }

        tokio::fs::write(pin_dir.join("value"), if value { "1" } else { "0" })
            .await
            .map_err(|e| io_error("write", pin, e))
    }

    async fn read(&self, pin: u32) -> Result<bool> {
        let raw = tokio::fs::read_to_string(self.pin_dir(pin).join("value"))
            .await
            .map_err(|e| io_error("read", pin, e))?;

        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(DomainError::DeviceIo(format!("GPIO {} has unexpected value '{}'", pin, other))),
        }
    }
}
