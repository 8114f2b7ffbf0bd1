//! Upload error types.

use skyupload_protocol::ProtocolError;
use skyupload_transfer::TransferError;

/// How the chunk state machine reacts to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retry the same chunk after a backoff delay.
    Transient,
    /// The session is unusable; start over with a new one.
    Expired,
    /// Ask the server which range it expects, then reconcile.
    Conflict,
    /// Give up immediately.
    Fatal,
    /// The upload finished but the content does not match.
    Integrity,
}

/// Errors produced by the upload client and engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("upload session expired")]
    SessionExpired,

    #[error("chunk at offset {offset} failed after {attempts} attempts")]
    RetriesExhausted { offset: u64, attempts: u32 },

    #[error("server expects offset {expected}, outside buffered range {start}..{end}")]
    RangeUnrecoverable { expected: u64, start: u64, end: u64 },

    #[error("upload failed after {sessions} sessions")]
    UploadFailed { sessions: u32 },

    #[error("commit failed with status {status}")]
    CommitFailed { status: u16 },

    #[error("hash mismatch: local {local}, remote {remote:?}")]
    HashMismatch {
        local: String,
        remote: Option<String>,
    },

    #[error("size mismatch: expected {expected} bytes, source yielded {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("empty files cannot be uploaded through a session")]
    EmptyFile,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Classifies the error for the retry state machine.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { status, .. } => match status {
                500..=599 => ErrorKind::Transient,
                404 => ErrorKind::Expired,
                409 | 416 => ErrorKind::Conflict,
                _ => ErrorKind::Fatal,
            },
            Self::Timeout => ErrorKind::Transient,
            Self::Http(e) if e.is_timeout() || e.is_connect() => ErrorKind::Transient,
            Self::SessionExpired | Self::MalformedResponse(_) | Self::Protocol(_) => {
                ErrorKind::Expired
            }
            Self::HashMismatch { .. } => ErrorKind::Integrity,
            _ => ErrorKind::Fatal,
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::CommitFailed { status } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for 401 and 403 responses.
    pub fn is_authentication(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
