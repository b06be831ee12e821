use async_trait::async_trait;
use bytes::Bytes;

/// The viewer's connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Port for one viewer's outbound transport
#[async_trait]
pub trait FrameSink: Send {
    /// Hand one encoded part to the transport.
    /// Resolves once the transport has accepted it, which may take a while under backpressure.
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Resolves when the viewer disconnects
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}
