//! Seams between the upload engine and the network.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use skyupload_protocol::{
    ChunkUploadResult, ContentRange, CreateUploadSessionRequest, DriveItem, PendingUpload,
    UploadSession,
};

use crate::error::Error;

/// Boxed future returned by transport and token calls.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// The five calls the upload engine makes.
///
/// [`GraphClient`](crate::GraphClient) is the production implementation.
pub trait UploadTransport: Send + Sync {
    /// Creates an upload session for `request.item.name` inside `folder_id`.
    fn create_upload_session<'a>(
        &'a self,
        folder_id: &'a str,
        request: &'a CreateUploadSessionRequest,
    ) -> TransportFuture<'a, UploadSession>;

    /// Sends one chunk. `body.len()` always equals `range.len()`.
    fn upload_chunk<'a>(
        &'a self,
        upload_url: &'a str,
        range: ContentRange,
        body: Bytes,
    ) -> TransportFuture<'a, ChunkUploadResult>;

    /// Asks the server which ranges it still expects.
    fn upload_status<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, PendingUpload>;

    /// Finalizes a deferred-commit session.
    fn commit<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, ()>;

    /// Looks up an item by folder and name.
    fn get_item<'a>(&'a self, folder_id: &'a str, name: &'a str) -> TransportFuture<'a, DriveItem>;
}

/// Supplies bearer tokens for authenticated calls.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> TransportFuture<'_, String>;
}

/// A fixed token, for scripts and tests.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> TransportFuture<'_, String> {
        let token = self.0.clone();
        Box::pin(async move { Ok(token) })
    }
}
