use lazy_static::lazy_static;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{DeviceId, StreamState};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Stream state per camera (0=Idle, 1=Starting, 2=Running, 3=Error)
    pub static ref STREAM_STATE: GaugeVec = GaugeVec::new(
        Opts::new("camera_stream_state", "Current decoder state per camera"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref FRAMES: IntCounterVec = IntCounterVec::new(
        Opts::new("camera_frames_total", "Complete JPEG frames assembled"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref FRAME_BYTES: IntCounterVec = IntCounterVec::new(
        Opts::new("camera_frame_bytes_total", "Bytes of assembled JPEG frames"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref RESTART_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("camera_restart_attempts_total", "Decoder restarts after a failure"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref ACTIVE_VIEWERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("camera_active_viewers", "Connected stream viewers"),
        &["camera"]
    ).expect("metric can be created");

    // Frames coalesced away for viewers that could not keep up
    pub static ref DROPPED_FRAMES: IntCounterVec = IntCounterVec::new(
        Opts::new("camera_dropped_frames_total", "Frames dropped from full viewer queues"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref DISCARDED_PARTIALS: IntCounterVec = IntCounterVec::new(
        Opts::new("camera_discarded_partial_frames_total", "Oversized output thrown away without an end-of-image marker"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref TRIGGER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("trigger_failures_total", "Triggers that failed, by target device"),
        &["device"]
    ).expect("metric can be created");

    pub static ref DRIFTS: IntCounterVec = IntCounterVec::new(
        Opts::new("device_drift_total", "State changes made outside the hub"),
        &["device"]
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(STREAM_STATE.clone()))?;
        REGISTRY.register(Box::new(FRAMES.clone()))?;
        REGISTRY.register(Box::new(FRAME_BYTES.clone()))?;
        REGISTRY.register(Box::new(RESTART_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(ACTIVE_VIEWERS.clone()))?;
        REGISTRY.register(Box::new(DROPPED_FRAMES.clone()))?;
        REGISTRY.register(Box::new(DISCARDED_PARTIALS.clone()))?;
        REGISTRY.register(Box::new(TRIGGER_FAILURES.clone()))?;
        REGISTRY.register(Box::new(DRIFTS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_stream_state(&self, camera: &str, state: StreamState) {
        STREAM_STATE.with_label_values(&[camera]).set(state.as_metric());
    }

    fn report_frame(&self, camera: &str, bytes: usize) {
        FRAMES.with_label_values(&[camera]).inc();
        FRAME_BYTES.with_label_values(&[camera]).inc_by(bytes as u64);
    }

    fn report_restart_attempt(&self, camera: &str) {
        RESTART_ATTEMPTS.with_label_values(&[camera]).inc();
    }

    fn report_viewer_connected(&self, camera: &str) {
        ACTIVE_VIEWERS.with_label_values(&[camera]).inc();
    }

    fn report_viewer_disconnected(&self, camera: &str) {
        ACTIVE_VIEWERS.with_label_values(&[camera]).dec();
    }

    fn report_frames_dropped(&self, camera: &str, count: u64) {
        DROPPED_FRAMES.with_label_values(&[camera]).inc_by(count);
    }

    fn report_partial_frame_discarded(&self, camera: &str) {
        DISCARDED_PARTIALS.with_label_values(&[camera]).inc();
    }

    fn report_trigger_failure(&self, target: &DeviceId) {
        TRIGGER_FAILURES.with_label_values(&[&target.to_string()]).inc();
    }

    fn report_drift(&self, device: &DeviceId) {
        DRIFTS.with_label_values(&[&device.to_string()]).inc();
    }
}
