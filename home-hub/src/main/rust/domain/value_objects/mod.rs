mod camera_config;
mod device;
mod frame;
mod retry_policy;
mod stream_state;
mod trigger;

pub use camera_config::{CameraConfig, DEFAULT_LOG_SIZE};
pub use device::{DeviceId, DeviceKind, DeviceStatus};
pub use frame::Frame;
pub use retry_policy::RetryPolicy;
pub use stream_state::{StreamState, StreamStatus};
pub use trigger::{find_trigger_cycle, Trigger};
