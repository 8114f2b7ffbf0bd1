//! Resumable large-file upload engine.
//!
//! One [`LargeFileUpload`] drives a single file through as many upload
//! sessions as it needs. Within a session it reads the source into an
//! [`UploadBuffer`], feeds every byte to a [`QuickXorHash`], sends chunks and
//! reconciles the server's expected ranges with what is still buffered. A
//! lost session restarts the whole upload from the first byte.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use skyupload_protocol::{
    ChunkUploadResult, ContentRange, CreateUploadSessionRequest, DriveItem, PendingUpload,
    UploadItemProperties, UploadSession,
};
use skyupload_transfer::{
    ByteStream, FileInfo, ProgressCallback, QuickXorHash, SpeedCalculator, TransferError,
    UploadBuffer, UploadProgress, validate_item_name,
};

use crate::config::UploadOptions;
use crate::error::{Error, ErrorKind};
use crate::retry::{ChunkRetry, ChunkState};
use crate::transport::UploadTransport;

/// How a session ended successfully.
enum Completion {
    /// The last chunk returned the finished item.
    Finished(DriveItem),
    /// Every byte is acknowledged; the session still needs a commit.
    AwaitingCommit,
}

/// Result of matching the server's expected offset against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciled {
    /// The server wants the same chunk again.
    Replay,
    /// The server holds the whole chunk.
    Advanced,
    /// The server holds part of the buffer; sending resumes from its offset.
    Rebased,
}

/// Uploads one file through chunked upload sessions.
pub struct LargeFileUpload<'a> {
    transport: &'a dyn UploadTransport,
    file: FileInfo,
    options: UploadOptions,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl<'a> LargeFileUpload<'a> {
    pub fn new(transport: &'a dyn UploadTransport, file: FileInfo, options: UploadOptions) -> Self {
        Self {
            transport,
            file,
            options,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Registers a callback invoked after every acknowledged chunk.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Aborts the upload with [`Error::Cancelled`] once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn file(&self) -> &FileInfo {
        &self.file
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Runs the upload to completion and returns the finished item.
    ///
    /// Creates at most `max_session_retries` sessions. Each new session
    /// reopens the content source and starts again from offset 0.
    pub async fn upload(&self) -> Result<DriveItem, Error> {
        validate_item_name(&self.file.name)?;
        self.options.validate()?;
        if self.file.size == 0 {
            return Err(Error::EmptyFile);
        }

        let request = CreateUploadSessionRequest {
            item: UploadItemProperties {
                conflict_behavior: self.options.conflict_behavior,
                name: self.file.name.clone(),
                file_size: self.file.size,
                description: self.options.description.clone(),
            },
            defer_commit: self.options.defer_commit,
        };

        let mut sessions = 0;
        while sessions < self.options.max_session_retries {
            self.check_cancelled()?;

            let stream = self.file.source.open().await?;
            sessions += 1;
            let session = self
                .transport
                .create_upload_session(&self.file.folder_id, &request)
                .await?;
            info!(
                name = %self.file.name,
                size = self.file.size,
                session = sessions,
                expires = %session.expiration_date_time,
                "upload session created"
            );

            let mut hasher = QuickXorHash::new();
            match self.send_all(&session, stream, &mut hasher).await {
                Ok(completion) => return self.finish(&session, completion, &hasher).await,
                Err(err) if err.kind() == ErrorKind::Expired => {
                    warn!(
                        name = %self.file.name,
                        session = sessions,
                        error = %err,
                        "upload session lost, restarting from the beginning"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        error!(name = %self.file.name, sessions, "giving up on upload");
        Err(Error::UploadFailed { sessions })
    }

    /// Sends the whole source through one session.
    async fn send_all(
        &self,
        session: &UploadSession,
        mut stream: ByteStream,
        hasher: &mut QuickXorHash,
    ) -> Result<Completion, Error> {
        let total = self.file.size;
        let mut buffer = UploadBuffer::new();
        let mut sizer = self.options.chunk_sizer();
        let mut retry = ChunkRetry::new(
            self.options.backoff_policy(),
            self.options.max_chunk_retries,
        );
        let mut speed = SpeedCalculator::default();
        speed.add_sample(0);
        let mut exhausted = false;

        loop {
            let chunk_size = sizer.current();
            while !exhausted && buffer.len() < chunk_size {
                match stream.next().await {
                    Some(piece) => {
                        let piece = piece.map_err(TransferError::from)?;
                        let read = buffer.end_byte() + piece.len() as u64;
                        if read > total {
                            return Err(Error::SizeMismatch {
                                expected: total,
                                actual: read,
                            });
                        }
                        hasher.update(&piece);
                        buffer.append(&piece);
                    }
                    None => exhausted = true,
                }
            }
            if exhausted && buffer.end_byte() < total {
                return Err(Error::SizeMismatch {
                    expected: total,
                    actual: buffer.end_byte(),
                });
            }

            if buffer.is_empty() {
                if session.deferred_commit {
                    return Ok(Completion::AwaitingCommit);
                }
                return Err(Error::MalformedResponse(
                    "all bytes acknowledged but the upload did not finish".into(),
                ));
            }

            let start = buffer.start_byte();
            let len = chunk_size.min(buffer.len());
            let range = ContentRange::new(start, len, total);
            let body = buffer.chunk(start, len)?;

            self.check_cancelled()?;
            if session.is_expired_at(Utc::now()) {
                warn!(offset = start, expires = %session.expiration_date_time, "upload session expired locally");
                return Err(Error::SessionExpired);
            }

            let state = retry.begin();
            debug!(range = %range, ?state, "uploading chunk");
            let sent_at = Instant::now();

            match self
                .transport
                .upload_chunk(&session.upload_url, range, body)
                .await
            {
                Ok(ChunkUploadResult::Complete(item)) => {
                    info!(id = %item.id, name = %item.name, size = item.size, "upload finished");
                    self.report(total, &mut speed, total - start, sizer.current());
                    return Ok(Completion::Finished(item));
                }
                Ok(ChunkUploadResult::Pending(pending)) => {
                    if range.is_final() && session.deferred_commit {
                        debug!("last chunk accepted, awaiting commit");
                        self.report(total, &mut speed, total - start, sizer.current());
                        return Ok(Completion::AwaitingCommit);
                    }

                    let expected = expected_start(&pending)?;
                    match reconcile(&mut buffer, expected, len)? {
                        Reconciled::Advanced => {
                            retry.on_success();
                            sizer.observe(len, sent_at.elapsed());
                        }
                        Reconciled::Rebased => {
                            warn!(offset = start, expected, "server skipped ahead, rebased buffer");
                            retry.on_success();
                        }
                        Reconciled::Replay => {
                            warn!(offset = start, "server did not take chunk, resending");
                            if !retry.on_replay() {
                                return Err(Error::RetriesExhausted {
                                    offset: start,
                                    attempts: retry.attempts(),
                                });
                            }
                            continue;
                        }
                    }
                    let acknowledged = buffer.start_byte() - start;
                    self.report(buffer.start_byte(), &mut speed, acknowledged, sizer.current());
                }
                Err(err) => match retry.on_failure(err.kind()) {
                    ChunkState::Retrying { retries, delay } => {
                        warn!(
                            offset = start,
                            retries,
                            delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                            error = %err,
                            "chunk failed, retrying"
                        );
                        self.sleep(delay).await?;
                    }
                    ChunkState::Reconciling { retries } => {
                        debug!(offset = start, retries, error = %err, "range conflict, querying upload status");
                        let pending = self.query_status(session, &mut retry, start).await?;
                        let expected = expected_start(&pending)?;
                        match reconcile(&mut buffer, expected, len)? {
                            Reconciled::Replay => {
                                debug!(offset = start, "server expects the same range");
                            }
                            Reconciled::Advanced | Reconciled::Rebased => {
                                debug!(offset = start, expected, "server already holds data, moving on");
                                retry.on_success();
                                let acknowledged = buffer.start_byte() - start;
                                self.report(
                                    buffer.start_byte(),
                                    &mut speed,
                                    acknowledged,
                                    sizer.current(),
                                );
                            }
                        }
                    }
                    ChunkState::Expired => return Err(err),
                    _ => return Err(give_up(err, start, retry.attempts())),
                },
            }
        }
    }

    /// Commits if needed, then checks the item's hash.
    async fn finish(
        &self,
        session: &UploadSession,
        completion: Completion,
        hasher: &QuickXorHash,
    ) -> Result<DriveItem, Error> {
        let item = match completion {
            Completion::Finished(item) => item,
            Completion::AwaitingCommit => {
                self.transport.commit(&session.upload_url).await?;
                self.transport
                    .get_item(&self.file.folder_id, &self.file.name)
                    .await?
            }
        };

        if self.options.validate_hash {
            let local = hasher.base64_digest();
            match item.quick_xor_hash() {
                Some(remote) if remote == local => {
                    debug!(hash = %local, "quickXorHash verified");
                }
                remote => {
                    error!(local = %local, remote = ?remote, "quickXorHash mismatch");
                    return Err(Error::HashMismatch {
                        local,
                        remote: remote.map(str::to_string),
                    });
                }
            }
        }

        Ok(item)
    }

    /// Asks the server for its expected ranges, retrying failed queries
    /// against the budget of the chunk at `offset`.
    async fn query_status(
        &self,
        session: &UploadSession,
        retry: &mut ChunkRetry,
        offset: u64,
    ) -> Result<PendingUpload, Error> {
        loop {
            let err = match self.transport.upload_status(&session.upload_url).await {
                Ok(pending) => return Ok(pending),
                Err(err) => err,
            };
            match retry.on_failure(err.kind()) {
                ChunkState::Retrying { retries, delay } => {
                    warn!(
                        offset,
                        retries,
                        delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                        error = %err,
                        "upload status query failed, retrying"
                    );
                    self.sleep(delay).await?;
                }
                ChunkState::Reconciling { retries } => {
                    debug!(offset, retries, error = %err, "upload status query conflicted, asking again");
                }
                ChunkState::Expired => return Err(err),
                _ => return Err(give_up(err, offset, retry.attempts())),
            }
        }
    }

    fn report(&self, transferred: u64, speed: &mut SpeedCalculator, delta: u64, chunk_size: u64) {
        speed.add_sample(delta);
        if let Some(callback) = &self.progress {
            callback(UploadProgress {
                name: self.file.name.clone(),
                total_bytes: self.file.size,
                transferred_bytes: transferred,
                bytes_per_second: speed.bytes_per_second(),
                chunk_size,
                eta_secs: speed
                    .eta(self.file.size.saturating_sub(transferred))
                    .map(|eta| eta.as_secs()),
            });
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<(), Error> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Maps the error that ended a chunk's retries to what the caller sees.
fn give_up(err: Error, offset: u64, attempts: u32) -> Error {
    match err.kind() {
        ErrorKind::Transient | ErrorKind::Conflict => {
            error!(offset, attempts, error = %err, "chunk retries exhausted");
            Error::RetriesExhausted { offset, attempts }
        }
        _ => err,
    }
}

fn expected_start(pending: &PendingUpload) -> Result<u64, Error> {
    pending.next_expected_start()?.ok_or_else(|| {
        Error::MalformedResponse("pending upload without nextExpectedRanges".into())
    })
}

/// Moves the buffer to the offset the server expects next.
///
/// `sent` is the length of the chunk that starts at the buffer's first byte.
fn reconcile(buffer: &mut UploadBuffer, expected: u64, sent: u64) -> Result<Reconciled, Error> {
    let start = buffer.start_byte();
    let end = buffer.end_byte();

    if expected == start {
        return Ok(Reconciled::Replay);
    }
    if expected == start + sent {
        buffer.consume(sent)?;
        return Ok(Reconciled::Advanced);
    }
    if buffer.contains(expected) {
        buffer.rebase(expected)?;
        return Ok(Reconciled::Rebased);
    }
    if expected == end {
        buffer.clear();
        return Ok(Reconciled::Rebased);
    }
    Err(Error::RangeUnrecoverable {
        expected,
        start,
        end,
    })
}
