use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::domain::ports::{FrameSink, SinkClosed};

/// Feeds a streaming response body. The channel holds a single part, so
/// `send` waits until the connection has taken the previous one.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end for the response body
    pub fn pair() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(1);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(chunk).await.map_err(|_| SinkClosed)
    }

    async fn closed(&mut self) {
        self.tx.closed().await
    }
}
