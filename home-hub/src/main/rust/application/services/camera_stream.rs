use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};

use super::process_supervisor::ProcessSupervisor;
use crate::domain::entities::{ExitKind, LogTail, StreamLifecycle};
use crate::domain::errors::Result;
use crate::domain::ports::DecoderLauncher;
use crate::domain::value_objects::{CameraConfig, Frame, StreamState, StreamStatus};

/// Capacity of the per-camera event feed
const EVENT_CAPACITY: usize = 64;

/// Lifecycle and frame notifications published by a camera stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Decoder spawned and the stream is Running
    Started { at: DateTime<Utc> },
    /// A complete frame was assembled
    Frame(Frame),
    /// Output grew past the frame limit without an end-of-image marker and was thrown away
    PartialDiscarded,
    /// Decoder was killed on request
    Stopped,
    /// Decoder exited on its own with status 0
    Exited,
    /// Decoder failed to spawn or exited abnormally
    Failed { reason: String, log: String },
}

/// One camera: its decoder supervisor, last-frame cache, log tail and event feed
pub struct CameraStream {
    shared: Arc<StreamShared>,
    supervisor: ProcessSupervisor,
}

impl CameraStream {
    pub fn new(
        id: impl Into<String>,
        config: CameraConfig,
        launcher: Arc<dyn DecoderLauncher>,
    ) -> Self {
        Self {
            shared: Arc::new(StreamShared::new(id.into(), config)),
            supervisor: ProcessSupervisor::new(launcher),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn config(&self) -> &CameraConfig {
        &self.shared.config
    }

    /// Start the decoder. No-op while one is already running.
    pub async fn start(&self) -> Result<()> {
        self.supervisor.start(&self.shared).await
    }

    /// Start the decoder only if the stream is still in Error. Returns whether a start was attempted.
    pub async fn restart_failed(&self) -> Result<bool> {
        self.supervisor.restart_failed(&self.shared).await
    }

    /// Kill the decoder, if any, and wait until the stream is back to Idle
    pub async fn stop(&self) {
        self.supervisor.stop(&self.shared).await
    }

    pub fn state(&self) -> StreamState {
        self.shared.status_tx.borrow().state
    }

    pub fn status(&self) -> StreamStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<StreamStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Most recent complete frame, if retention is enabled
    pub fn last_frame(&self) -> Option<Frame> {
        self.shared.last_frame.read().clone()
    }

    pub fn log_tail(&self) -> String {
        self.shared.log.lock().as_str().to_string()
    }

    /// OS id of the live decoder process
    pub async fn pid(&self) -> Option<u32> {
        self.supervisor.pid().await
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<StreamShared> {
        &self.shared
    }
}

/// State shared between a stream's handle and its decoder monitor task
pub(crate) struct StreamShared {
    id: String,
    config: CameraConfig,
    lifecycle: Mutex<StreamLifecycle>,
    status_tx: watch::Sender<StreamStatus>,
    events_tx: broadcast::Sender<StreamEvent>,
    last_frame: RwLock<Option<Frame>>,
    log: Mutex<LogTail>,
    next_seq: AtomicU64,
}

impl StreamShared {
    fn new(id: String, config: CameraConfig) -> Self {
        let (status_tx, _) = watch::channel(StreamStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let log = LogTail::new(config.log_size());

        Self {
            id,
            config,
            lifecycle: Mutex::new(StreamLifecycle::new()),
            status_tx,
            events_tx,
            last_frame: RwLock::new(None),
            log: Mutex::new(log),
            next_seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> StreamState {
        self.lifecycle.lock().current_state()
    }

    fn transition(&self, apply: impl FnOnce(&mut StreamLifecycle)) -> StreamStatus {
        let status = {
            let mut lifecycle = self.lifecycle.lock();
            apply(&mut lifecycle);
            lifecycle.status()
        };
        self.status_tx.send_replace(status);
        status
    }

    fn emit(&self, event: StreamEvent) {
        // No receivers is fine
        let _ = self.events_tx.send(event);
    }

    /// A new decoder is about to be spawned
    pub(crate) fn begin_run(&self) {
        self.log.lock().clear();
        self.transition(StreamLifecycle::transition_to_starting);
    }

    pub(crate) fn mark_running(&self) {
        let status = self.transition(StreamLifecycle::transition_to_running);
        let at = status.started_at.unwrap_or_else(Utc::now);
        self.emit(StreamEvent::Started { at });
    }

    pub(crate) fn spawn_failed(&self, reason: String) {
        self.transition(|lifecycle| lifecycle.transition_to_error(Some(reason.clone())));
        let log = self.log.lock().as_str().to_string();
        self.emit(StreamEvent::Failed { reason, log });
    }

    pub(crate) fn publish_frame(&self, data: Bytes) {
        let frame = Frame::new(self.next_seq.fetch_add(1, Ordering::Relaxed), data);

        // Cache before announcing so subscribers can dedupe against it
        if self.config.retains_last_frame() {
            *self.last_frame.write() = Some(frame.clone());
        }
        self.emit(StreamEvent::Frame(frame));
    }

    pub(crate) fn discard_partial(&self) {
        self.emit(StreamEvent::PartialDiscarded);
    }

    pub(crate) fn append_log(&self, chunk: &str) {
        if self.config.captures_logs() {
            self.log.lock().append(chunk);
        }
    }

    /// The decoder process is gone; classify how it ended
    pub(crate) fn finish(&self, exit: ExitKind) {
        let mut next = StreamState::Idle;
        self.transition(|lifecycle| next = lifecycle.apply_exit(exit));

        match (exit, next) {
            (ExitKind::Requested, _) => self.emit(StreamEvent::Stopped),
            (_, StreamState::Error) => {
                let log = self.log.lock().as_str().to_string();
                let reason = match exit {
                    ExitKind::Failed { code: Some(code) } => format!("decoder exited with status {}", code),
                    _ => "decoder was terminated by a signal".to_string(),
                };
                self.emit(StreamEvent::Failed { reason, log });
            }
            _ => self.emit(StreamEvent::Exited),
        }
    }

    /// Explicit stop with no live process: a failed stream goes back to Idle
    pub(crate) fn park(&self) {
        if self.state() != StreamState::Error {
            return;
        }
        self.transition(|lifecycle| lifecycle.transition_to_idle(Some("stopped".to_string())));
        self.emit(StreamEvent::Stopped);
    }
}
