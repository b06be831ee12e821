use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::camera_stream::StreamShared;
use crate::domain::entities::{ExitKind, FrameAssembler};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::DecoderLauncher;
use crate::domain::value_objects::StreamState;

/// Read size for decoder output
const READ_CHUNK: usize = 64 * 1024;

/// How long to wait for buffered output after the process has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

struct RunHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl RunHandle {
    fn is_alive(&self) -> bool {
        !self.monitor.is_finished()
    }
}

/// Owns at most one decoder process for a camera.
///
/// `start` and `stop` are serialized through the run lock, so a new process is only
/// spawned once the previous one has been reaped.
pub struct ProcessSupervisor {
    launcher: Arc<dyn DecoderLauncher>,
    run: Mutex<Option<RunHandle>>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn DecoderLauncher>) -> Self {
        Self {
            launcher,
            run: Mutex::new(None),
        }
    }

    pub(crate) async fn start(&self, stream: &Arc<StreamShared>) -> Result<()> {
        let mut run = self.run.lock().await;
        self.start_locked(&mut run, stream).await
    }

    /// Start again only if the stream is still in Error. Returns whether a start was attempted.
    pub(crate) async fn restart_failed(&self, stream: &Arc<StreamShared>) -> Result<bool> {
        let mut run = self.run.lock().await;
        if stream.state() != StreamState::Error {
            return Ok(false);
        }
        self.start_locked(&mut run, stream).await.map(|()| true)
    }

    async fn start_locked(&self, run: &mut Option<RunHandle>, stream: &Arc<StreamShared>) -> Result<()> {
        if let Some(handle) = run.as_mut() {
            if handle.is_alive() && stream.state().is_on() {
                tracing::debug!(camera = %stream.id(), pid = ?handle.pid, "Decoder already running");
                return Ok(());
            }
            // The previous run has ended but its monitor may still be finishing
            if let Err(err) = (&mut handle.monitor).await {
                tracing::warn!(camera = %stream.id(), error = %err, "Decoder monitor task failed");
            }
        }
        *run = None;

        stream.begin_run();

        let mut child = match self.launcher.launch(stream.config()) {
            Ok(child) => child,
            Err(err) => {
                stream.spawn_failed(err.to_string());
                return Err(err);
            }
        };

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.start_kill();
                let err = DomainError::ProcessSpawnFailure {
                    camera: stream.id().to_string(),
                    reason: "decoder output is not piped".to_string(),
                };
                stream.spawn_failed(err.to_string());
                return Err(err);
            }
        };

        let pid = child.id();
        stream.mark_running();
        tracing::debug!(camera = %stream.id(), pid = ?pid, "Decoder spawned");

        let (kill_tx, kill_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(child, stdout, stderr, kill_rx, Arc::clone(stream)));

        *run = Some(RunHandle {
            pid,
            kill_tx: Some(kill_tx),
            monitor,
        });

        Ok(())
    }

    pub(crate) async fn stop(&self, stream: &StreamShared) {
        let mut run = self.run.lock().await;

        if let Some(mut handle) = run.take() {
            if let Some(kill_tx) = handle.kill_tx.take() {
                // Receiver is gone if the process already exited
                let _ = kill_tx.send(());
            }
            if let Err(err) = (&mut handle.monitor).await {
                tracing::warn!(camera = %stream.id(), error = %err, "Decoder monitor task failed");
            }
        }

        stream.park();
    }

    pub(crate) async fn pid(&self) -> Option<u32> {
        self.run
            .lock()
            .await
            .as_ref()
            .filter(|handle| handle.is_alive())
            .and_then(|handle| handle.pid)
    }
}

/// Watch one decoder process until it exits or is killed
async fn monitor(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    kill_rx: oneshot::Receiver<()>,
    stream: Arc<StreamShared>,
) {
    let mut frames = tokio::spawn(pump_frames(stdout, FrameAssembler::new(), Arc::clone(&stream)));
    let mut logs = tokio::spawn(pump_logs(stderr, Arc::clone(&stream)));

    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => ExitKind::Clean,
            Ok(status) => ExitKind::Failed { code: status.code() },
            Err(err) => {
                tracing::warn!(camera = %stream.id(), error = %err, "Failed to wait for decoder");
                ExitKind::Failed { code: None }
            }
        },
        _ = kill_rx => {
            if let Err(err) = child.kill().await {
                tracing::warn!(camera = %stream.id(), error = %err, "Failed to kill decoder");
            }
            ExitKind::Requested
        }
    };

    // Let the pumps flush the last frame and log lines
    drain(&mut frames).await;
    drain(&mut logs).await;

    tracing::debug!(camera = %stream.id(), exit = ?exit, "Decoder exited");
    stream.finish(exit);
}

async fn drain(task: &mut JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut *task)
        .await
        .is_err()
    {
        task.abort();
    }
}

async fn pump_frames<R>(mut stdout: R, mut assembler: FrameAssembler, stream: Arc<StreamShared>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let discarded = assembler.discarded();
                let frame = assembler.push(&buf[..n]);
                if assembler.discarded() > discarded {
                    stream.discard_partial();
                }
                if let Some(frame) = frame {
                    stream.publish_frame(frame);
                }
            }
            Err(err) => {
                tracing::debug!(camera = %stream.id(), error = %err, "Decoder stdout closed");
                break;
            }
        }
    }
}

async fn pump_logs(mut stderr: ChildStderr, stream: Arc<StreamShared>) {
    let mut buf = vec![0u8; 4096];
    let mut pending = Vec::new();

    // Always drained so the decoder never blocks on a full pipe
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let text = take_utf8(&mut pending);
                if !text.is_empty() {
                    stream.append_log(&text);
                }
            }
        }
    }

    if !pending.is_empty() {
        stream.append_log(&String::from_utf8_lossy(&pending));
    }
}

/// Decode the complete part of `pending`, leaving a character cut off at the end for the next read.
/// Invalid sequences become U+FFFD.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut rest: &[u8] = &pending[..];

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match err.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }

    let consumed = pending.len() - rest.len();
    pending.drain(..consumed);
    text
}
