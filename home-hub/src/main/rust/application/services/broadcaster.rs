use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::camera_stream::{CameraStream, StreamEvent};
use crate::domain::ports::{FrameSink, MetricsReporter};
use crate::domain::value_objects::{Frame, StreamState, StreamStatus};

/// Multipart boundary used on every stream response
pub const BOUNDARY: &str = "stream";

/// Content type of a live stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=stream";

/// Placeholder tickers never run faster than this
const MIN_PLACEHOLDER_INTERVAL: Duration = Duration::from_millis(1);

/// Wrap one JPEG in the multipart envelope
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 4);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n\r\n");
    part.freeze()
}

/// Still images shown to viewers while the camera is not running
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    off: Option<Bytes>,
    error: Option<Bytes>,
}

impl Placeholders {
    pub fn new(off: Option<Bytes>, error: Option<Bytes>) -> Self {
        Self {
            off: off.map(|jpeg| multipart_part(&jpeg)),
            error: error.map(|jpeg| multipart_part(&jpeg)),
        }
    }

    /// Encoded part to show for `state`, if any
    pub fn for_state(&self, state: StreamState) -> Option<&Bytes> {
        match state {
            StreamState::Idle => self.off.as_ref(),
            StreamState::Error => self.error.as_ref(),
            StreamState::Starting | StreamState::Running => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    /// Parts buffered per viewer before the oldest is dropped
    pub queue_capacity: usize,
    /// Cadence of placeholder frames while not running
    pub placeholder_interval: Duration,
    pub placeholders: Placeholders,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            placeholder_interval: Duration::from_millis(200),
            placeholders: Placeholders::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Default)]
struct PendingParts {
    parts: VecDeque<Bytes>,
    last_seq: Option<u64>,
    dropped: u64,
}

/// One viewer's outbound queue.
///
/// Parts leave in arrival order. When the queue is full the oldest part is dropped,
/// so a stalled viewer resumes close to live.
#[derive(Debug)]
pub struct ViewerSubscription {
    id: SubscriptionId,
    capacity: usize,
    pending: Mutex<PendingParts>,
    notify: Notify,
    write_in_flight: AtomicBool,
}

impl ViewerSubscription {
    fn new(capacity: usize) -> Self {
        Self {
            id: SubscriptionId(Uuid::new_v4()),
            capacity: capacity.max(1),
            pending: Mutex::new(PendingParts::default()),
            notify: Notify::new(),
            write_in_flight: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().parts.len()
    }

    pub fn dropped(&self) -> u64 {
        self.pending.lock().dropped
    }

    pub fn is_write_in_flight(&self) -> bool {
        self.write_in_flight.load(Ordering::Acquire)
    }

    /// Queue a live frame unless this viewer already has it or something newer.
    /// Returns true if an older part had to be dropped.
    fn offer_frame(&self, frame: &Frame) -> bool {
        let mut pending = self.pending.lock();
        if pending.last_seq.is_some_and(|seen| frame.seq() <= seen) {
            return false;
        }
        pending.last_seq = Some(frame.seq());
        let dropped = self.enqueue(&mut pending, multipart_part(frame.data()));
        drop(pending);

        self.notify.notify_one();
        dropped
    }

    fn offer_placeholder(&self, part: Bytes) -> bool {
        let dropped = self.enqueue(&mut self.pending.lock(), part);
        self.notify.notify_one();
        dropped
    }

    fn enqueue(&self, pending: &mut PendingParts, part: Bytes) -> bool {
        let mut dropped = false;
        if pending.parts.len() >= self.capacity {
            pending.parts.pop_front();
            pending.dropped += 1;
            dropped = true;
        }
        pending.parts.push_back(part);
        dropped
    }

    fn pop(&self) -> Option<Bytes> {
        self.pending.lock().parts.pop_front()
    }
}

type Subscribers = Arc<Mutex<HashMap<SubscriptionId, Arc<ViewerSubscription>>>>;

/// Fans one camera's frames out to every connected viewer
pub struct Broadcaster {
    stream: Arc<CameraStream>,
    options: BroadcastOptions,
    subscribers: Subscribers,
    metrics: Arc<dyn MetricsReporter>,
}

impl Broadcaster {
    pub fn new(
        stream: Arc<CameraStream>,
        options: BroadcastOptions,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stream,
            options,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        })
    }

    pub fn stream(&self) -> &Arc<CameraStream> {
        &self.stream
    }

    /// Forward frames from the camera's event feed until the broadcaster is dropped
    pub fn spawn_relay(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.stream.events();
        let this: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StreamEvent::Frame(frame)) => match this.upgrade() {
                        Some(broadcaster) => broadcaster.publish(&frame),
                        None => break,
                    },
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Broadcast relay lagged behind the decoder");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Queue `frame` for every current viewer. Never waits on a viewer.
    pub fn publish(&self, frame: &Frame) {
        let subscribers = self.subscribers.lock();
        for subscription in subscribers.values() {
            if subscription.offer_frame(frame) {
                self.metrics.report_frames_dropped(self.stream.id(), 1);
            }
        }
    }

    /// Attach a viewer. The cached last frame, if any, is queued first.
    pub fn subscribe(&self, sink: Box<dyn FrameSink>) -> SubscriptionId {
        let subscription = Arc::new(ViewerSubscription::new(self.options.queue_capacity));
        let id = subscription.id();

        {
            let mut subscribers = self.subscribers.lock();
            if let Some(frame) = self.stream.last_frame() {
                subscription.offer_frame(&frame);
            }
            subscribers.insert(id, Arc::clone(&subscription));
        }

        let camera = self.stream.id().to_string();
        self.metrics.report_viewer_connected(&camera);
        tracing::debug!(camera = %camera, subscription = %id, "Viewer connected");

        let pump = ViewerPump {
            camera,
            subscription,
            status: self.stream.watch_status(),
            placeholders: self.options.placeholders.clone(),
            interval: self.options.placeholder_interval.max(MIN_PLACEHOLDER_INTERVAL),
            subscribers: Arc::clone(&self.subscribers),
            metrics: Arc::clone(&self.metrics),
        };
        tokio::spawn(pump.run(sink));

        id
    }

    pub fn viewer_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Arc<ViewerSubscription>> {
        self.subscribers.lock().get(&id).cloned()
    }

    /// Single still image: the cached frame when running, otherwise the next one produced.
    /// `None` when the camera is not running or stops before producing a frame.
    pub async fn still(&self) -> Option<Bytes> {
        // Subscribe first so a frame published right after the checks is not missed
        let mut events = self.stream.events();

        if !self.stream.state().is_running() {
            return None;
        }
        if let Some(frame) = self.stream.last_frame() {
            return Some(frame.data().clone());
        }

        loop {
            match events.recv().await {
                Ok(StreamEvent::Frame(frame)) => return Some(frame.data().clone()),
                Ok(StreamEvent::Started { .. } | StreamEvent::PartialDiscarded) | Err(RecvError::Lagged(_)) => {
                    continue
                }
                Ok(StreamEvent::Stopped | StreamEvent::Exited | StreamEvent::Failed { .. }) => {
                    return None
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Drains one subscription into its transport
struct ViewerPump {
    camera: String,
    subscription: Arc<ViewerSubscription>,
    status: watch::Receiver<StreamStatus>,
    placeholders: Placeholders,
    interval: Duration,
    subscribers: Subscribers,
    metrics: Arc<dyn MetricsReporter>,
}

impl ViewerPump {
    async fn run(self, mut sink: Box<dyn FrameSink>) {
        self.deliver(sink.as_mut()).await;

        self.subscribers.lock().remove(&self.subscription.id());
        self.metrics.report_viewer_disconnected(&self.camera);
        tracing::debug!(
            camera = %self.camera,
            subscription = %self.subscription.id(),
            dropped = self.subscription.dropped(),
            "Viewer disconnected"
        );
    }

    async fn deliver(&self, sink: &mut dyn FrameSink) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            while let Some(part) = self.subscription.pop() {
                self.subscription.write_in_flight.store(true, Ordering::Release);
                let sent = sink.send(part).await;
                self.subscription.write_in_flight.store(false, Ordering::Release);

                if sent.is_err() {
                    return;
                }
            }

            tokio::select! {
                _ = self.subscription.notify.notified() => {}
                _ = ticker.tick() => {
                    let state = self.status.borrow().state;
                    if let Some(part) = self.placeholders.for_state(state) {
                        if self.subscription.offer_placeholder(part.clone()) {
                            self.metrics.report_frames_dropped(&self.camera, 1);
                        }
                    }
                }
                _ = sink.closed() => return,
            }
        }
    }
}
