pub mod devices;
pub mod ffmpeg;
pub mod http;
pub mod metrics;
