mod broadcaster;
mod camera_stream;
mod camera_watchdog;
mod device_registry;
mod drift_poller;
mod hub;
mod process_supervisor;
mod trigger_engine;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcaster::{
    multipart_part, BroadcastOptions, Broadcaster, Placeholders, SubscriptionId, ViewerSubscription, BOUNDARY,
    STREAM_CONTENT_TYPE,
};
pub use camera_stream::{CameraStream, StreamEvent};
pub use camera_watchdog::CameraWatchdog;
pub use device_registry::{Device, DeviceRegistry, ObservedStates};
pub use drift_poller::DriftPoller;
pub use hub::{CameraChannel, Hub};
pub use process_supervisor::ProcessSupervisor;
pub use trigger_engine::{Cascade, TriggerEngine};
