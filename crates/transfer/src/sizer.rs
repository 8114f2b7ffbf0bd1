use std::time::Duration;

use skyupload_protocol::constants::{CHUNK_UNIT, DEFAULT_TARGET_CHUNK_DURATION, MAX_CHUNK_SIZE};

/// Durations below this carry no usable throughput signal.
const MIN_INFORMATIVE_DURATION: Duration = Duration::from_millis(1);

/// Picks the size of the next chunk.
///
/// With adaptation disabled the size never changes. With it enabled, every
/// observed transfer retargets the size so that one chunk takes about
/// `target` to send, rounded down to whole [`CHUNK_UNIT`]s and clamped to
/// `[CHUNK_UNIT, max]`.
#[derive(Debug, Clone)]
pub struct ChunkSizer {
    current: u64,
    max: u64,
    target: Duration,
    adaptive: bool,
}

impl ChunkSizer {
    /// Creates a sizer with a fixed chunk size.
    pub fn fixed(size: u64) -> Self {
        Self {
            current: size,
            max: size.max(MAX_CHUNK_SIZE),
            target: DEFAULT_TARGET_CHUNK_DURATION,
            adaptive: false,
        }
    }

    /// Creates an adaptive sizer starting at `initial`.
    pub fn adaptive(initial: u64, max: u64, target: Duration) -> Self {
        Self {
            current: initial,
            max: round_down_to_unit(max).max(CHUNK_UNIT),
            target,
            adaptive: true,
        }
    }

    /// Size of the next chunk.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Upper bound on chunk size.
    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Records that `bytes` took `elapsed` to transfer and returns the
    /// size to use next.
    pub fn observe(&mut self, bytes: u64, elapsed: Duration) -> u64 {
        if !self.adaptive || elapsed < MIN_INFORMATIVE_DURATION || bytes == 0 {
            return self.current;
        }

        let throughput = bytes as f64 / elapsed.as_secs_f64();
        let wanted = (throughput * self.target.as_secs_f64()) as u64;
        self.current = round_down_to_unit(wanted).clamp(CHUNK_UNIT, self.max);

        tracing::trace!(
            bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            next_chunk = self.current,
            "chunk size adjusted"
        );
        self.current
    }
}

/// Rounds `size` down to a multiple of [`CHUNK_UNIT`].
pub fn round_down_to_unit(size: u64) -> u64 {
    size - size % CHUNK_UNIT
}
