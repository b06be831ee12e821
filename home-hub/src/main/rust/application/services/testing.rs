//! Doubles shared by the service tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Child;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{DecoderLauncher, DeviceDriver, MetricsReporter};
use crate::domain::value_objects::{CameraConfig, DeviceId, DeviceStatus, StreamState};

/// Launcher whose decoder can never be spawned
pub(crate) struct FailingLauncher;

impl DecoderLauncher for FailingLauncher {
    fn launch(&self, camera: &CameraConfig) -> Result<Child> {
        Err(DomainError::ProcessSpawnFailure {
            camera: camera.source().to_string(),
            reason: "no decoder in tests".to_string(),
        })
    }
}

/// Counts what it is told
#[derive(Default)]
pub(crate) struct CountingMetrics {
    pub restarts: AtomicUsize,
    pub dropped: AtomicUsize,
    pub discarded: AtomicUsize,
    pub trigger_failures: Mutex<Vec<DeviceId>>,
    pub drifts: Mutex<Vec<DeviceId>>,
}

impl MetricsReporter for CountingMetrics {
    fn report_stream_state(&self, _camera: &str, _state: StreamState) {}

    fn report_frame(&self, _camera: &str, _bytes: usize) {}

    fn report_restart_attempt(&self, _camera: &str) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn report_viewer_connected(&self, _camera: &str) {}

    fn report_viewer_disconnected(&self, _camera: &str) {}

    fn report_frames_dropped(&self, _camera: &str, count: u64) {
        self.dropped.fetch_add(count as usize, Ordering::SeqCst);
    }

    fn report_partial_frame_discarded(&self, _camera: &str) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }

    fn report_trigger_failure(&self, target: &DeviceId) {
        self.trigger_failures.lock().push(target.clone());
    }

    fn report_drift(&self, device: &DeviceId) {
        self.drifts.lock().push(device.clone());
    }
}

/// In-memory switch that records every write into a shared journal
pub(crate) struct FakeSwitch {
    id: DeviceId,
    state: AtomicBool,
    broken: AtomicBool,
    journal: Arc<Mutex<Vec<(DeviceId, bool)>>>,
}

impl FakeSwitch {
    pub fn new(id: DeviceId, journal: Arc<Mutex<Vec<(DeviceId, bool)>>>) -> Self {
        Self {
            id,
            state: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            journal,
        }
    }

    pub fn broken(self) -> Self {
        self.broken.store(true, Ordering::SeqCst);
        self
    }

    /// Change the state behind the hub's back
    pub fn force(&self, on: bool) {
        self.state.store(on, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDriver for FakeSwitch {
    async fn read_state(&self) -> Result<DeviceStatus> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DomainError::DeviceIo(format!("{} unreachable", self.id)));
        }
        Ok(DeviceStatus::switched(self.is_on()))
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DomainError::DeviceIo(format!("{} unreachable", self.id)));
        }
        self.state.store(on, Ordering::SeqCst);
        self.journal.lock().push((self.id.clone(), on));
        Ok(())
    }
}

/// Registry-ready switches by id, plus the journal they write to
#[derive(Default)]
pub(crate) struct SwitchBank {
    pub switches: HashMap<DeviceId, Arc<FakeSwitch>>,
    pub journal: Arc<Mutex<Vec<(DeviceId, bool)>>>,
}

impl SwitchBank {
    pub fn add(&mut self, id: DeviceId) -> Arc<FakeSwitch> {
        self.insert(FakeSwitch::new(id, Arc::clone(&self.journal)))
    }

    pub fn add_broken(&mut self, id: DeviceId) -> Arc<FakeSwitch> {
        self.insert(FakeSwitch::new(id, Arc::clone(&self.journal)).broken())
    }

    fn insert(&mut self, switch: FakeSwitch) -> Arc<FakeSwitch> {
        let switch = Arc::new(switch);
        self.switches.insert(switch.id.clone(), Arc::clone(&switch));
        switch
    }

    pub fn writes(&self) -> Vec<(DeviceId, bool)> {
        self.journal.lock().clone()
    }
}
