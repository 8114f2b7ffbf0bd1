//! Per-chunk retry state machine with exponential backoff.
//!
//! The machine never performs I/O. The engine feeds it the outcome of each
//! attempt and acts on the returned [`ChunkState`].

use std::time::Duration;

use crate::error::ErrorKind;

const BACKOFF_FACTOR: f64 = 2.0;

/// Exponential backoff: `base * 2^retries`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(64))
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the retry that follows `retries` earlier retries.
    pub fn delay_for_retry(&self, retries: u32) -> Duration {
        let exp = retries.min(63) as i32;
        let secs = self.base.as_secs_f64() * BACKOFF_FACTOR.powi(exp);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

/// Where a chunk is in its send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Idle,
    Sending { attempt: u32 },
    Success,
    /// Sleep for `delay`, then resend the same chunk.
    Retrying { retries: u32, delay: Duration },
    /// Query the server for its expected range.
    Reconciling { retries: u32 },
    /// Abandon the session.
    Expired,
    Fatal,
}

/// Tracks retries for the chunk currently in flight.
///
/// One counter covers every retryable path. Any forward progress resets it.
#[derive(Debug, Clone)]
pub struct ChunkRetry {
    policy: BackoffPolicy,
    max_retries: u32,
    retries: u32,
    state: ChunkState,
}

impl ChunkRetry {
    pub fn new(policy: BackoffPolicy, max_retries: u32) -> Self {
        Self {
            policy,
            max_retries,
            retries: 0,
            state: ChunkState::Idle,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Number of sends made for the current chunk, counting the one in flight.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub fn begin(&mut self) -> ChunkState {
        self.state = ChunkState::Sending {
            attempt: self.attempts(),
        };
        self.state
    }

    /// The server advanced past the chunk.
    pub fn on_success(&mut self) -> ChunkState {
        self.retries = 0;
        self.state = ChunkState::Success;
        self.state
    }

    /// Decides what to do after a failed attempt of the given kind.
    pub fn on_failure(&mut self, kind: ErrorKind) -> ChunkState {
        self.state = match kind {
            ErrorKind::Transient if self.retries < self.max_retries => {
                let delay = self.policy.delay_for_retry(self.retries);
                self.retries += 1;
                ChunkState::Retrying {
                    retries: self.retries,
                    delay,
                }
            }
            ErrorKind::Conflict if self.retries < self.max_retries => {
                self.retries += 1;
                ChunkState::Reconciling {
                    retries: self.retries,
                }
            }
            ErrorKind::Expired => ChunkState::Expired,
            _ => ChunkState::Fatal,
        };
        self.state
    }

    /// Counts a same-range replay requested by the server.
    ///
    /// Returns `false` once the retry budget is spent.
    pub fn on_replay(&mut self) -> bool {
        if self.retries < self.max_retries {
            self.retries += 1;
            true
        } else {
            self.state = ChunkState::Fatal;
            false
        }
    }
}
