use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;

use home_hub::application::services::{BroadcastOptions, Broadcaster};
use home_hub::domain::value_objects::CameraConfig;
use home_hub::infrastructure::devices::SysfsGpio;
use home_hub::infrastructure::http;
use home_hub::{
    build_hub, Adapters, CameraStream, CameraWatchdog, DecoderCommandBuilder, DecoderLauncher, DeviceId,
    DomainError, HubConfig, MetricsReporter, RetryPolicy, StreamEvent, StreamState,
};

/// Stands in for ffmpeg. `$2` is the camera source, which selects the behaviour.
const FAKE_DECODER: &str = r#"
case "$2" in
  frames) printf '\377\330one\377\331'; sleep 0.2; printf '\377\330two\377\331'; exit 0 ;;
  fail) echo "connection refused" >&2; exit 1 ;;
  live) printf '\377\330live\377\331'; exec sleep 30 ;;
  *) exit 2 ;;
esac
"#;

/// Runs the fake decoder through `sh -c` with the real decoder arguments
struct ShLauncher;

impl DecoderLauncher for ShLauncher {
    fn launch(&self, camera: &CameraConfig) -> home_hub::Result<Child> {
        Command::new("sh")
            .arg("-c")
            .arg(FAKE_DECODER)
            .arg("fake-ffmpeg")
            .args(DecoderCommandBuilder::build_args(camera))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::ProcessSpawnFailure {
                camera: camera.source().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Fails the first spawn, then behaves like `ShLauncher`
#[derive(Default)]
struct FlakyLauncher {
    launches: AtomicUsize,
}

impl DecoderLauncher for FlakyLauncher {
    fn launch(&self, camera: &CameraConfig) -> home_hub::Result<Child> {
        if self.launches.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(DomainError::ProcessSpawnFailure {
                camera: camera.source().to_string(),
                reason: "device busy".to_string(),
            });
        }
        ShLauncher.launch(camera)
    }
}

#[derive(Default)]
struct TestMetrics {
    restarts: AtomicUsize,
}

impl MetricsReporter for TestMetrics {
    fn report_stream_state(&self, _camera: &str, _state: StreamState) {}
    fn report_frame(&self, _camera: &str, _bytes: usize) {}
    fn report_restart_attempt(&self, _camera: &str) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
    fn report_viewer_connected(&self, _camera: &str) {}
    fn report_viewer_disconnected(&self, _camera: &str) {}
    fn report_frames_dropped(&self, _camera: &str, _count: u64) {}
    fn report_partial_frame_discarded(&self, _camera: &str) {}
    fn report_trigger_failure(&self, _target: &DeviceId) {}
    fn report_drift(&self, _device: &DeviceId) {}
}

fn camera(source: &str) -> Arc<CameraStream> {
    let config = CameraConfig::new(source).unwrap().with_last_frame(true);
    Arc::new(CameraStream::new("1", config, Arc::new(ShLauncher)))
}

fn jpeg(body: &[u8]) -> Bytes {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(body);
    data.extend_from_slice(&[0xFF, 0xD9]);
    Bytes::from(data)
}

/// Next event that is not a frame, collecting frames seen on the way
async fn next_lifecycle(events: &mut broadcast::Receiver<StreamEvent>, frames: &mut Vec<Bytes>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                StreamEvent::Frame(frame) => frames.push(frame.data().clone()),
                other => return other,
            }
        }
    })
    .await
    .expect("lifecycle event within timeout")
}

#[tokio::test]
async fn test_clean_exit_keeps_last_frame() {
    let stream = camera("frames");
    let mut events = stream.events();
    let mut frames = Vec::new();

    stream.start().await.unwrap();
    assert!(matches!(next_lifecycle(&mut events, &mut frames).await, StreamEvent::Started { .. }));
    assert!(matches!(next_lifecycle(&mut events, &mut frames).await, StreamEvent::Exited));

    assert_eq!(frames, [jpeg(b"one"), jpeg(b"two")]);
    assert_eq!(stream.state(), StreamState::Idle);
    assert_eq!(stream.last_frame().map(|f| f.data().clone()), Some(jpeg(b"two")));
}

#[tokio::test]
async fn test_abnormal_exit_reports_log_tail() {
    let stream = camera("fail");
    let mut events = stream.events();
    let mut frames = Vec::new();

    stream.start().await.unwrap();
    next_lifecycle(&mut events, &mut frames).await;

    match next_lifecycle(&mut events, &mut frames).await {
        StreamEvent::Failed { reason, log } => {
            assert!(reason.contains("status 1"), "{}", reason);
            assert!(log.contains("connection refused"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(stream.state(), StreamState::Error);
    assert!(stream.log_tail().contains("connection refused"));
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_reaps() {
    let stream = camera("live");
    let mut events = stream.events();
    let mut frames = Vec::new();

    stream.start().await.unwrap();
    let pid = stream.pid().await;
    assert!(pid.is_some());

    stream.start().await.unwrap();
    assert_eq!(stream.pid().await, pid);
    assert_eq!(stream.state(), StreamState::Running);

    stream.stop().await;
    assert_eq!(stream.state(), StreamState::Idle);
    assert_eq!(stream.pid().await, None);

    assert!(matches!(next_lifecycle(&mut events, &mut frames).await, StreamEvent::Started { .. }));
    assert!(matches!(next_lifecycle(&mut events, &mut frames).await, StreamEvent::Stopped));

    stream.start().await.unwrap();
    assert_ne!(stream.pid().await, pid);
    stream.stop().await;
}

#[tokio::test]
async fn test_still_returns_frame_of_running_camera() {
    let stream = camera("live");
    let broadcaster = Broadcaster::new(
        stream.clone(),
        BroadcastOptions::default(),
        Arc::new(TestMetrics::default()),
    );
    broadcaster.spawn_relay();

    stream.start().await.unwrap();
    let still = tokio::time::timeout(Duration::from_secs(5), broadcaster.still())
        .await
        .unwrap();
    assert_eq!(still, Some(jpeg(b"live")));

    stream.stop().await;
    assert_eq!(broadcaster.still().await, None);
}

#[tokio::test]
async fn test_watchdog_retries_failed_decoder() {
    let stream = camera("fail");
    let metrics = Arc::new(TestMetrics::default());
    CameraWatchdog::new(
        stream.clone(),
        "Front door (1)",
        Some(RetryPolicy::fixed(Duration::from_millis(50))),
        metrics.clone(),
    )
    .spawn();

    stream.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.restarts.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    stream.stop().await;
    assert_eq!(stream.state(), StreamState::Idle);
}

#[tokio::test]
async fn test_manual_restart_wins_over_pending_retry() {
    let launcher = Arc::new(FlakyLauncher::default());
    let config = CameraConfig::new("live").unwrap();
    let stream = Arc::new(CameraStream::new("1", config, launcher.clone()));
    let metrics = Arc::new(TestMetrics::default());
    CameraWatchdog::new(
        stream.clone(),
        "Front door (1)",
        Some(RetryPolicy::fixed(Duration::from_millis(200))),
        metrics.clone(),
    )
    .spawn();

    assert!(stream.start().await.is_err());
    assert_eq!(stream.state(), StreamState::Error);

    // Operator brings the camera back before the retry is due
    stream.start().await.unwrap();
    assert_eq!(stream.state(), StreamState::Running);
    let pid = stream.pid().await.expect("decoder pid");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(stream.pid().await, Some(pid));
    assert_eq!(stream.state(), StreamState::Running);
    assert_eq!(metrics.restarts.load(Ordering::SeqCst), 0);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);

    assert!(!stream.restart_failed().await.unwrap());
    assert_eq!(stream.pid().await, Some(pid));

    stream.stop().await;
    assert_eq!(stream.state(), StreamState::Idle);
}

/// Hub wired from a config file: GPIO PSU whose inverted trigger switches a live camera
async fn wired_hub(gpio_root: &std::path::Path) -> home_hub::HubRuntime {
    std::fs::create_dir_all(gpio_root.join("gpio17")).unwrap();
    std::fs::write(gpio_root.join("gpio17/direction"), "in").unwrap();
    std::fs::write(gpio_root.join("gpio17/value"), "0").unwrap();

    let config = HubConfig::parse(
        r#"{
            "psus": { "1": { "name": "Printer", "gpio": 17, "triggers": ["camera:1:1"] } },
            "cameras": { "1": { "name": "Bed", "path": "live", "storeLastFrame": true } }
        }"#,
    )
    .unwrap();

    build_hub(
        &config,
        Adapters {
            launcher: Arc::new(ShLauncher),
            gpio: Arc::new(SysfsGpio::new(gpio_root)),
            metrics: Arc::new(TestMetrics::default()),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_trigger_switches_camera_through_api() {
    let gpio_root = tempfile::tempdir().unwrap();
    let runtime = wired_hub(gpio_root.path()).await;
    let api = http::routes(Arc::clone(runtime.hub()));

    // Autostarted
    let camera = runtime.hub().camera("1").unwrap().stream().clone();
    assert_eq!(camera.state(), StreamState::Running);

    let response = warp::test::request()
        .method("POST")
        .path("/psu/1/on")
        .reply(&api)
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        std::fs::read_to_string(gpio_root.path().join("gpio17/value")).unwrap(),
        "1"
    );
    assert_eq!(camera.state(), StreamState::Idle);

    let response = warp::test::request().path("/cameras").reply(&api).await;
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, serde_json::json!([{ "state": false, "stream": "idle" }]));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_stream_endpoint_serves_multipart() {
    let gpio_root = tempfile::tempdir().unwrap();
    let runtime = wired_hub(gpio_root.path()).await;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, server) = http::bind(
        Arc::clone(runtime.hub()),
        ([127, 0, 0, 1], 0).into(),
        async move {
            let _ = stop_rx.await;
        },
    )
    .unwrap();
    let server = tokio::spawn(server);

    let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    socket
        .write_all(b"GET /camera/1/stream HTTP/1.1\r\nHost: hub\r\n\r\n")
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while !received.windows(4).any(|w| w == b"live") {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed early");
            received.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&received).into_owned()
    })
    .await
    .unwrap();

    assert!(received.starts_with("HTTP/1.1 200"));
    assert!(received.contains("multipart/x-mixed-replace; boundary=stream"));
    assert!(received.contains("--stream\r\nContent-Type: image/jpeg\r\nContent-Length: 8\r\n\r\n"));

    drop(socket);
    runtime.shutdown().await;
    let _ = stop_tx.send(());
    server.abort();
}

#[tokio::test]
async fn test_unknown_trigger_target_fails_startup() {
    let config = HubConfig::parse(r#"{ "lights": { "1": { "gpio": 4, "triggers": ["psu:9"] } } }"#).unwrap();
    let gpio_root = tempfile::tempdir().unwrap();

    let result = build_hub(
        &config,
        Adapters {
            launcher: Arc::new(ShLauncher),
            gpio: Arc::new(SysfsGpio::new(gpio_root.path())),
            metrics: Arc::new(TestMetrics::default()),
        },
    )
    .await;
    assert!(result.is_err());
}
