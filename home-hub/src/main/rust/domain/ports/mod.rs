mod decoder_launcher;
mod device_driver;
mod frame_sink;
mod gpio_port;
mod metrics_reporter;

pub use decoder_launcher::DecoderLauncher;
pub use device_driver::DeviceDriver;
pub use frame_sink::{FrameSink, SinkClosed};
pub use gpio_port::GpioPort;
pub use metrics_reporter::MetricsReporter;
