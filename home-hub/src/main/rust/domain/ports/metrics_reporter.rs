use crate::domain::value_objects::{DeviceId, StreamState};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_stream_state(&self, camera: &str, state: StreamState);
    fn report_frame(&self, camera: &str, bytes: usize);
    fn report_restart_attempt(&self, camera: &str);
    fn report_viewer_connected(&self, camera: &str);
    fn report_viewer_disconnected(&self, camera: &str);
    fn report_frames_dropped(&self, camera: &str, count: u64);
    fn report_partial_frame_discarded(&self, camera: &str);
    fn report_trigger_failure(&self, target: &DeviceId);
    fn report_drift(&self, device: &DeviceId);
}
