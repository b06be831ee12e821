use bytes::Bytes;

/// One complete JPEG image produced by a decoder, tagged with its position in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    seq: u64,
    data: Bytes,
}

impl Frame {
    pub fn new(seq: u64, data: Bytes) -> Self {
        Self { seq, data }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
