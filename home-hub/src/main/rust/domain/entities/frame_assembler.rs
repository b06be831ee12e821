use bytes::{Bytes, BytesMut};

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on an accumulating frame before it is discarded as garbage
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Reassembles a decoder's raw MJPEG output into complete frames.
///
/// Chunks arrive with arbitrary boundaries. After each chunk, if the accumulated
/// bytes end with the EOI marker they form one frame and the buffer is reset.
/// A stream that never produces the marker never emits.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    max_frame_bytes: usize,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_bytes,
            discarded: 0,
        }
    }

    /// Feed one chunk, returning a frame if the chunk completed one
    pub fn push(&mut self, chunk: &[u8]) -> Option<Bytes> {
        if chunk.is_empty() {
            return None;
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.ends_with(&JPEG_EOI) {
            return Some(self.buffer.split().freeze());
        }

        if self.buffer.len() > self.max_frame_bytes {
            tracing::warn!(
                buffered = self.buffer.len(),
                limit = self.max_frame_bytes,
                "No end-of-image marker within frame limit, discarding buffered bytes"
            );
            self.buffer.clear();
            self.discarded += 1;
        }

        None
    }

    /// Bytes accumulated towards the next frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times an oversized partial frame was thrown away
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
