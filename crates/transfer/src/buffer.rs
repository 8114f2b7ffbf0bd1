use bytes::{Bytes, BytesMut};

use crate::TransferError;

/// Window of not-yet-acknowledged upload bytes.
///
/// `start_byte` is the absolute file offset of the first buffered byte. It
/// only ever moves forward; a restarted upload builds a fresh buffer.
#[derive(Debug, Default)]
pub struct UploadBuffer {
    data: BytesMut,
    start_byte: u64,
}

impl UploadBuffer {
    /// Creates an empty buffer starting at offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute offset of the first buffered byte.
    pub fn start_byte(&self) -> u64 {
        self.start_byte
    }

    /// Absolute offset one past the last buffered byte.
    pub fn end_byte(&self) -> u64 {
        self.start_byte + self.data.len() as u64
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if `offset` addresses a buffered byte.
    pub fn contains(&self, offset: u64) -> bool {
        self.start_byte <= offset && offset < self.end_byte()
    }

    /// Appends freshly read stream data.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Removes and returns the first `n` bytes, advancing `start_byte`.
    pub fn consume(&mut self, n: u64) -> Result<Bytes, TransferError> {
        if n > self.len() {
            return Err(self.out_of_range(self.start_byte + n));
        }
        let taken = self.data.split_to(n as usize).freeze();
        self.start_byte += n;
        Ok(taken)
    }

    /// Drops every byte before `new_start`.
    ///
    /// Valid only while `new_start` addresses a buffered byte; anything
    /// earlier has already been discarded and cannot be recovered.
    pub fn rebase(&mut self, new_start: u64) -> Result<(), TransferError> {
        if !self.contains(new_start) {
            return Err(self.out_of_range(new_start));
        }
        let skip = (new_start - self.start_byte) as usize;
        let _ = self.data.split_to(skip);
        self.start_byte = new_start;
        Ok(())
    }

    /// Discards everything buffered. `start_byte` moves to the old end.
    pub fn clear(&mut self) {
        self.start_byte = self.end_byte();
        self.data.clear();
    }

    /// Copies `len` bytes starting at absolute `offset` into a chunk body.
    pub fn chunk(&self, offset: u64, len: u64) -> Result<Bytes, TransferError> {
        let end = offset.saturating_add(len);
        if offset < self.start_byte || end > self.end_byte() {
            return Err(self.out_of_range(offset));
        }
        let from = (offset - self.start_byte) as usize;
        let to = (end - self.start_byte) as usize;
        Ok(Bytes::copy_from_slice(&self.data[from..to]))
    }

    fn out_of_range(&self, offset: u64) -> TransferError {
        TransferError::OutOfBuffer {
            offset,
            start: self.start_byte,
            end: self.end_byte(),
        }
    }
}
