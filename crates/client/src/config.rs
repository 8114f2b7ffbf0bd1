//! Upload options.
//!
//! All fields have serde defaults, so a partial TOML or JSON table is enough
//! to configure an upload.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use skyupload_protocol::ConflictBehavior;
use skyupload_protocol::constants::{
    CHUNK_UNIT, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_RETRIES, DEFAULT_MAX_SESSION_RETRIES,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TARGET_CHUNK_DURATION, MAX_CHUNK_SIZE,
};
use skyupload_transfer::ChunkSizer;

use crate::error::Error;
use crate::retry::BackoffPolicy;

/// Caller-supplied configuration for one large-file upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Size of each chunk (and the starting size when adaptive sizing is on).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Upper bound for adaptive sizing.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,

    /// Number of upload sessions created before giving up.
    #[serde(default = "default_max_session_retries")]
    pub max_session_retries: u32,

    /// In-place retries per chunk.
    #[serde(default = "default_max_chunk_retries")]
    pub max_chunk_retries: u32,

    /// Compare the server's QuickXorHash with the local one.
    #[serde(default = "default_true")]
    pub validate_hash: bool,

    #[serde(default)]
    pub adaptive_chunk_size: bool,

    #[serde(default = "default_target_chunk_duration_secs")]
    pub target_chunk_duration_secs: u64,

    /// What the service does when an item with the same name exists.
    #[serde(default)]
    pub conflict_behavior: ConflictBehavior,

    /// Keep the item unfinalized until an explicit commit.
    #[serde(default)]
    pub defer_commit: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Timeout of each individual HTTP call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay before the first chunk retry; doubles on every retry.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    MAX_CHUNK_SIZE
}

fn default_max_session_retries() -> u32 {
    DEFAULT_MAX_SESSION_RETRIES
}

fn default_max_chunk_retries() -> u32 {
    DEFAULT_MAX_CHUNK_RETRIES
}

fn default_true() -> bool {
    true
}

fn default_target_chunk_duration_secs() -> u64 {
    DEFAULT_TARGET_CHUNK_DURATION.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_backoff_base_secs() -> f64 {
    1.0
}

fn default_backoff_max_secs() -> f64 {
    64.0
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            max_session_retries: default_max_session_retries(),
            max_chunk_retries: default_max_chunk_retries(),
            validate_hash: default_true(),
            adaptive_chunk_size: false,
            target_chunk_duration_secs: default_target_chunk_duration_secs(),
            conflict_behavior: ConflictBehavior::default(),
            defer_commit: false,
            description: None,
            request_timeout_secs: default_request_timeout_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

impl UploadOptions {
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: u64) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_max_session_retries(mut self, retries: u32) -> Self {
        self.max_session_retries = retries;
        self
    }

    pub fn with_max_chunk_retries(mut self, retries: u32) -> Self {
        self.max_chunk_retries = retries;
        self
    }

    pub fn with_validate_hash(mut self, validate: bool) -> Self {
        self.validate_hash = validate;
        self
    }

    pub fn with_adaptive_chunk_size(mut self, adaptive: bool) -> Self {
        self.adaptive_chunk_size = adaptive;
        self
    }

    pub fn with_conflict_behavior(mut self, behavior: ConflictBehavior) -> Self {
        self.conflict_behavior = behavior;
        self
    }

    pub fn with_defer_commit(mut self, defer: bool) -> Self {
        self.defer_commit = defer;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn target_chunk_duration(&self) -> Duration {
        Duration::from_secs(self.target_chunk_duration_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs_f64(self.backoff_base_secs),
            Duration::from_secs_f64(self.backoff_max_secs),
        )
    }

    /// Builds the chunk sizer these options describe.
    pub fn chunk_sizer(&self) -> ChunkSizer {
        if self.adaptive_chunk_size {
            ChunkSizer::adaptive(
                self.chunk_size,
                self.max_chunk_size,
                self.target_chunk_duration(),
            )
        } else {
            ChunkSizer::fixed(self.chunk_size)
        }
    }

    /// Checks the options before any request is made.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_chunk_size < CHUNK_UNIT || self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_chunk_size must be between {CHUNK_UNIT} and {MAX_CHUNK_SIZE}, got {}",
                self.max_chunk_size
            )));
        }
        if self.chunk_size == 0 || self.chunk_size % CHUNK_UNIT != 0 {
            return Err(Error::InvalidConfig(format!(
                "chunk_size must be a positive multiple of {CHUNK_UNIT}, got {}",
                self.chunk_size
            )));
        }
        if self.chunk_size > self.max_chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} exceeds max_chunk_size {}",
                self.chunk_size, self.max_chunk_size
            )));
        }
        if self.max_session_retries == 0 {
            return Err(Error::InvalidConfig(
                "max_session_retries must be at least 1".into(),
            ));
        }
        if self.adaptive_chunk_size && self.target_chunk_duration_secs == 0 {
            return Err(Error::InvalidConfig(
                "target_chunk_duration_secs must be positive".into(),
            ));
        }
        for (name, value) in [
            ("backoff_base_secs", self.backoff_base_secs),
            ("backoff_max_secs", self.backoff_max_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}
