//! Local side of a chunked upload: content sources, the streaming
//! QuickXorHash, the upload buffer and chunk sizing.
//!
//! Nothing in this crate talks to the network.

mod buffer;
mod progress;
mod quickxor;
mod sizer;
mod source;
mod types;
mod validation;

pub use buffer::UploadBuffer;
pub use progress::{ProgressCallback, SpeedCalculator, UploadProgress};
pub use quickxor::{DIGEST_LEN, QuickXorHash, quickxor_bytes};
pub use sizer::{ChunkSizer, round_down_to_unit};
pub use source::{ByteStream, ContentSource, FileSource, MemorySource, StreamSource};
pub use types::FileInfo;
pub use validation::validate_item_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content source cannot be restarted")]
    NotRestartable,

    #[error("offset {offset} outside buffered range {start}..{end}")]
    OutOfBuffer { offset: u64, start: u64, end: u64 },

    #[error("invalid item name: {0}")]
    InvalidName(String),
}
