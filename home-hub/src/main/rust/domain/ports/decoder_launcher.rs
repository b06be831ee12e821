use tokio::process::Child;

use crate::domain::errors::Result;
use crate::domain::value_objects::CameraConfig;

/// Port for spawning a camera's external decoding process.
///
/// The returned child must have piped stdout (MJPEG bytes) and stderr (diagnostics).
pub trait DecoderLauncher: Send + Sync {
    fn launch(&self, camera: &CameraConfig) -> Result<Child>;
}
