mod camera_device;
mod gpio_relay;
mod smart_plug;
mod sysfs_gpio;

pub use camera_device::CameraDevice;
pub use gpio_relay::GpioRelay;
pub use smart_plug::{codec, SmartPlug, SmartPlugClient, SysInfo, DEFAULT_PLUG_PORT};
pub use sysfs_gpio::SysfsGpio;
