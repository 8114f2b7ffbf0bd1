//! Wire types for the drive upload-session protocol.
//!
//! Covers the `createUploadSession` request, the session resource, chunk
//! responses and the finalized drive item. No I/O happens here.

pub mod constants;
pub mod items;
pub mod session;

pub use items::{DriveItem, FileFacet, FolderFacet, Hashes, ItemParentReference};
pub use session::{
    ChunkUploadResult, ConflictBehavior, ContentRange, CreateUploadSessionRequest,
    PendingUpload, UploadItemProperties, UploadSession,
};

/// Errors produced while decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty response body")]
    EmptyBody,

    #[error("invalid byte range: {0}")]
    InvalidRange(String),
}
