use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::io::ReaderStream;

use crate::TransferError;

/// Sequential file content, delivered in arbitrarily sized pieces.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Read size used when streaming from disk.
const FILE_READ_CAPACITY: usize = 256 * 1024;

/// Provides the bytes of the file being uploaded.
///
/// Every call to [`open`](Self::open) must yield the content from its first
/// byte. A restarted upload session calls `open` again; sources that cannot
/// rewind return [`TransferError::NotRestartable`] instead.
pub trait ContentSource: Send + Sync {
    /// Opens a fresh stream over the whole content.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ByteStream, TransferError>> + Send + '_>>;
}

/// Streams a file from disk, reopening it on every attempt.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for FileSource {
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ByteStream, TransferError>> + Send + '_>> {
        Box::pin(async move {
            let file = tokio::fs::File::open(&self.path).await?;
            let stream: ByteStream = Box::pin(ReaderStream::with_capacity(file, FILE_READ_CAPACITY));
            Ok(stream)
        })
    }
}

/// In-memory content, yielded in pieces of `piece_size` bytes.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    piece_size: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            piece_size: FILE_READ_CAPACITY,
        }
    }

    /// Sets the size of each yielded piece (minimum 1).
    pub fn with_piece_size(mut self, piece_size: usize) -> Self {
        self.piece_size = piece_size.max(1);
        self
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ContentSource for MemorySource {
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ByteStream, TransferError>> + Send + '_>> {
        let pieces: Vec<std::io::Result<Bytes>> = (0..self.data.len())
            .step_by(self.piece_size)
            .map(|start| {
                let end = (start + self.piece_size).min(self.data.len());
                Ok(self.data.slice(start..end))
            })
            .collect();
        Box::pin(async move {
            let stream: ByteStream = futures_util::stream::iter(pieces).boxed();
            Ok(stream)
        })
    }
}

/// Wraps a one-shot stream. The first `open` hands it out; later calls
/// fail with [`TransferError::NotRestartable`].
pub struct StreamSource {
    stream: Mutex<Option<ByteStream>>,
}

impl StreamSource {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Mutex::new(Some(Box::pin(stream))),
        }
    }
}

impl ContentSource for StreamSource {
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ByteStream, TransferError>> + Send + '_>> {
        let taken = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Box::pin(async move { taken.ok_or(TransferError::NotRestartable) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut stream: ByteStream) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut pieces = 0;
        while let Some(piece) = stream.next().await {
            out.extend_from_slice(&piece.unwrap());
            pieces += 1;
        }
        (out, pieces)
    }

    #[tokio::test]
    async fn memory_source_yields_pieces() {
        let source = MemorySource::new(vec![7u8; 10]).with_piece_size(4);
        let (data, pieces) = collect(source.open().await.unwrap()).await;
        assert_eq!(data, vec![7u8; 10]);
        assert_eq!(pieces, 3);
    }

    #[tokio::test]
    async fn memory_source_restarts_from_beginning() {
        let source = MemorySource::new(b"abcdef".to_vec()).with_piece_size(2);
        let (first, _) = collect(source.open().await.unwrap()).await;
        let (second, _) = collect(source.open().await.unwrap()).await;
        assert_eq!(first, b"abcdef");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn empty_memory_source_yields_nothing() {
        let source = MemorySource::new(Vec::new());
        assert!(source.is_empty());
        let (data, pieces) = collect(source.open().await.unwrap()).await;
        assert!(data.is_empty());
        assert_eq!(pieces, 0);
    }

    #[tokio::test]
    async fn file_source_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let content: Vec<u8> = (0..600_000u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let source = FileSource::new(&path);
        let (first, _) = collect(source.open().await.unwrap()).await;
        let (second, _) = collect(source.open().await.unwrap()).await;
        assert_eq!(first, content);
        assert_eq!(second, content);
    }

    #[tokio::test]
    async fn file_source_missing_file() {
        let source = FileSource::new("/nonexistent/skyupload/payload.bin");
        assert!(matches!(source.open().await, Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn stream_source_is_single_use() {
        let stream = futures_util::stream::iter(vec![Ok(Bytes::from_static(b"once"))]);
        let source = StreamSource::new(stream);

        let (data, _) = collect(source.open().await.unwrap()).await;
        assert_eq!(data, b"once");
        assert!(matches!(
            source.open().await,
            Err(TransferError::NotRestartable)
        ));
    }
}
