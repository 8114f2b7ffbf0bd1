//! Resumable large-file uploads to a Graph drive.
//!
//! [`LargeFileUpload`] runs the chunked upload-session protocol over any
//! [`UploadTransport`]; [`GraphClient`] is the `reqwest`-backed transport.

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod transport;
pub mod upload;

pub use client::GraphClient;
pub use config::UploadOptions;
pub use error::{Error, ErrorKind};
pub use retry::{BackoffPolicy, ChunkRetry, ChunkState};
pub use transport::{StaticToken, TokenProvider, TransportFuture, UploadTransport};
pub use upload::LargeFileUpload;
