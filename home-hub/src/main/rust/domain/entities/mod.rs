mod frame_assembler;
mod log_tail;
mod stream_lifecycle;

pub use frame_assembler::{FrameAssembler, DEFAULT_MAX_FRAME_BYTES, JPEG_EOI};
pub use log_tail::LogTail;
pub use stream_lifecycle::{ExitKind, StateTransition, StreamLifecycle};
