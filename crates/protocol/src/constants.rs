use std::time::Duration;

/// Base URL of the Graph drive API.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Every chunk except the last one must be a multiple of this size (320 KiB).
pub const CHUNK_UNIT: u64 = 320 * 1024;

/// Default chunk size: 16 units (5 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * CHUNK_UNIT;

/// Largest chunk the service accepts in a single PUT (60 MiB).
pub const MAX_CHUNK_SIZE: u64 = 60 * 1024 * 1024;

/// Default number of upload sessions created before giving up.
pub const DEFAULT_MAX_SESSION_RETRIES: u32 = 5;

/// Default number of in-place retries for a single chunk.
pub const DEFAULT_MAX_CHUNK_RETRIES: u32 = 5;

/// Chunk duration the adaptive sizer aims for.
pub const DEFAULT_TARGET_CHUNK_DURATION: Duration = Duration::from_secs(5);

/// Timeout applied to each individual HTTP call.
///
/// Chunk uploads of up to 60 MiB on slow links need far more than the
/// usual request/response budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// JSON key carrying the conflict directive in the session request.
pub const CONFLICT_BEHAVIOR_KEY: &str = "@microsoft.graph.conflictBehavior";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_is_unit_aligned() {
        assert_eq!(DEFAULT_CHUNK_SIZE % CHUNK_UNIT, 0);
        assert_eq!(DEFAULT_CHUNK_SIZE, 5 * 1024 * 1024);
    }

    #[test]
    fn max_chunk_is_above_default() {
        assert!(MAX_CHUNK_SIZE > DEFAULT_CHUNK_SIZE);
        assert_eq!(MAX_CHUNK_SIZE % CHUNK_UNIT, 0);
    }
}
