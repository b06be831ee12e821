use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::camera_stream::{CameraStream, StreamEvent};
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{RetryPolicy, StreamState};

/// Watches one camera's event feed: logs lifecycle changes, reports metrics
/// and restarts the decoder after a failure when a retry policy is set.
pub struct CameraWatchdog {
    stream: Arc<CameraStream>,
    label: String,
    retry: Option<RetryPolicy>,
    metrics: Arc<dyn MetricsReporter>,
}

impl CameraWatchdog {
    pub fn new(
        stream: Arc<CameraStream>,
        label: impl Into<String>,
        retry: Option<RetryPolicy>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            stream,
            label: label.into(),
            retry,
            metrics,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let events = self.stream.events();
        tokio::spawn(self.run(events))
    }

    async fn run(self, mut events: tokio::sync::broadcast::Receiver<StreamEvent>) {
        let camera = self.stream.id().to_string();
        let mut delay = self.retry.as_ref().map(RetryPolicy::initial_delay);

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };

            match event {
                StreamEvent::Frame(frame) => {
                    self.metrics.report_frame(&camera, frame.len());
                    // Producing output counts as a healthy run
                    delay = self.retry.as_ref().map(RetryPolicy::initial_delay);
                }
                StreamEvent::PartialDiscarded => {
                    self.metrics.report_partial_frame_discarded(&camera);
                }
                StreamEvent::Started { at } => {
                    tracing::info!(camera = %camera, started_at = %at, "[Camera] {} started", self.label);
                    self.metrics.report_stream_state(&camera, StreamState::Running);
                }
                StreamEvent::Stopped | StreamEvent::Exited => {
                    tracing::info!(camera = %camera, "[Camera] {} closed", self.label);
                    self.metrics.report_stream_state(&camera, self.stream.state());
                }
                StreamEvent::Failed { reason, log } => {
                    tracing::error!(
                        camera = %camera,
                        reason = %reason,
                        log = %log,
                        "[Camera] {} had an error",
                        self.label
                    );
                    self.metrics.report_stream_state(&camera, StreamState::Error);

                    if let (Some(policy), Some(current)) = (&self.retry, delay) {
                        self.schedule_retry(current);
                        delay = Some(policy.next_delay(current));
                    }
                }
            }
        }
    }

    fn schedule_retry(&self, delay: Duration) {
        let stream = Arc::clone(&self.stream);
        let metrics = Arc::clone(&self.metrics);
        let label = self.label.clone();

        tracing::info!(camera = %stream.id(), delay = ?delay, "[Camera] {} will retry", label);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // A stop or manual start in the meantime wins over the retry
            match stream.restart_failed().await {
                Ok(true) => metrics.report_restart_attempt(stream.id()),
                Ok(false) => tracing::debug!(camera = %stream.id(), "Camera recovered, skipping retry"),
                Err(err) => {
                    metrics.report_restart_attempt(stream.id());
                    tracing::warn!(camera = %stream.id(), error = %err, "[Camera] {} retry failed", label);
                }
            }
        });
    }
}
