pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    Broadcaster, CameraStream, CameraWatchdog, DeviceRegistry, DriftPoller, Hub, StreamEvent, TriggerEngine,
};
pub use bootstrap::{build_hub, Adapters, HubRuntime};
pub use config::{Config, HubConfig};
pub use domain::entities::{FrameAssembler, StreamLifecycle};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{DecoderLauncher, DeviceDriver, FrameSink, GpioPort, MetricsReporter};
pub use domain::value_objects::{DeviceId, DeviceKind, DeviceStatus, RetryPolicy, StreamState, Trigger};
pub use infrastructure::ffmpeg::{DecoderCommandBuilder, FfmpegLauncher};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
