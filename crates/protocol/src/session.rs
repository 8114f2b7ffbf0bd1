use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::items::DriveItem;

/// What the service does when an item with the same name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    /// Fail the upload.
    #[default]
    Fail,
    /// Overwrite the existing item.
    #[serde(alias = "overwrite")]
    Replace,
    /// Store the upload under an automatically renamed item.
    Rename,
}

impl ConflictBehavior {
    /// Wire value of the directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Replace => "replace",
            Self::Rename => "rename",
        }
    }
}

/// Item properties sent with `createUploadSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItemProperties {
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
    pub name: String,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of the `createUploadSession` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadSessionRequest {
    pub item: UploadItemProperties,
    pub defer_commit: bool,
}

/// Server-issued upload session.
///
/// `upload_url` is a capability: chunk, status and commit calls against it
/// carry no `Authorization` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    pub expiration_date_time: DateTime<Utc>,
    /// Set locally from the request; the service does not echo it back.
    #[serde(skip)]
    pub deferred_commit: bool,
}

impl UploadSession {
    /// Returns `true` once `now` has reached the session expiration.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration_date_time
    }
}

/// Non-terminal state of an upload session.
///
/// Returned by accepted (non-final) chunk PUTs and by status queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

impl PendingUpload {
    /// Start offset of the first expected range.
    ///
    /// Only the first range is authoritative. Returns `Ok(None)` when the
    /// service lists no ranges at all.
    pub fn next_expected_start(&self) -> Result<Option<u64>, ProtocolError> {
        match self.next_expected_ranges.first() {
            Some(range) => parse_range_start(range).map(Some),
            None => Ok(None),
        }
    }
}

/// Response to a chunk PUT.
///
/// A finalized item always carries `id` and `name`; anything else is
/// treated as a pending session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkUploadResult {
    /// The last chunk was accepted and the item exists.
    Complete(DriveItem),
    /// More bytes are expected.
    Pending(PendingUpload),
}

impl ChunkUploadResult {
    /// Decodes a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::EmptyBody);
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Returns `true` if this result finalized the item.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Parses the start offset out of a `"start-"` or `"start-end"` range.
pub fn parse_range_start(range: &str) -> Result<u64, ProtocolError> {
    let start = range.split('-').next().unwrap_or_default().trim();
    start
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidRange(range.to_string()))
}

/// Value of the `Content-Range` header for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
    /// Total size of the file being uploaded.
    pub total: u64,
}

impl ContentRange {
    /// Range covering `len` bytes starting at `start`. `len` must be non-zero.
    pub fn new(start: u64, len: u64, total: u64) -> Self {
        Self {
            start,
            end: start + len.saturating_sub(1),
            total,
        }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`: a range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if this range ends at the last byte of the file.
    pub fn is_final(&self) -> bool {
        self.end + 1 >= self.total
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn create_request_field_names() {
        let req = CreateUploadSessionRequest {
            item: UploadItemProperties {
                conflict_behavior: ConflictBehavior::Rename,
                name: "video.mp4".into(),
                file_size: 42,
                description: None,
            },
            defer_commit: true,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "item": {
                    "@microsoft.graph.conflictBehavior": "rename",
                    "name": "video.mp4",
                    "fileSize": 42
                },
                "deferCommit": true
            })
        );
    }

    #[test]
    fn create_request_includes_description() {
        let req = CreateUploadSessionRequest {
            item: UploadItemProperties {
                conflict_behavior: ConflictBehavior::Fail,
                name: "a.bin".into(),
                file_size: 1,
                description: Some("nightly".into()),
            },
            defer_commit: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""description":"nightly""#));
        assert!(json.contains(r#""deferCommit":false"#));
    }

    #[test]
    fn conflict_behavior_accepts_overwrite_alias() {
        let parsed: ConflictBehavior = serde_json::from_str(r#""overwrite""#).unwrap();
        assert_eq!(parsed, ConflictBehavior::Replace);
        assert_eq!(
            serde_json::to_string(&ConflictBehavior::Replace).unwrap(),
            r#""replace""#
        );
    }

    #[test]
    fn session_parses_and_expires() {
        let json = r#"{"uploadUrl":"https://up.example/s1","expirationDateTime":"2030-01-01T00:00:00Z"}"#;
        let session: UploadSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.upload_url, "https://up.example/s1");
        assert!(!session.deferred_commit);

        let before = Utc.with_ymd_and_hms(2029, 12, 31, 23, 59, 59).unwrap();
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(!session.is_expired_at(before));
        assert!(session.is_expired_at(at));
    }

    #[test]
    fn pending_result_exposes_first_range() {
        let body = br#"{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["5242880-","9000000-9999999"]}"#;
        let result = ChunkUploadResult::from_slice(body).unwrap();
        let ChunkUploadResult::Pending(pending) = result else {
            panic!("expected pending result");
        };
        assert_eq!(pending.next_expected_start().unwrap(), Some(5_242_880));
    }

    #[test]
    fn complete_result_is_item() {
        let body = br#"{"id":"item-1","name":"a.bin","size":3,"file":{"mimeType":"application/octet-stream","hashes":{"quickXorHash":"abc="}}}"#;
        let result = ChunkUploadResult::from_slice(body).unwrap();
        assert!(result.is_complete());
        let ChunkUploadResult::Complete(item) = result else {
            unreachable!()
        };
        assert_eq!(item.quick_xor_hash(), Some("abc="));
    }

    #[test]
    fn pending_without_ranges_has_no_start() {
        let result = ChunkUploadResult::from_slice(b"{}").unwrap();
        let ChunkUploadResult::Pending(pending) = result else {
            panic!("expected pending result");
        };
        assert_eq!(pending.next_expected_start().unwrap(), None);
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(matches!(
            ChunkUploadResult::from_slice(b"  "),
            Err(ProtocolError::EmptyBody)
        ));
    }

    #[test]
    fn malformed_range_is_rejected() {
        assert!(parse_range_start("abc-").is_err());
        assert_eq!(parse_range_start("0-").unwrap(), 0);
        assert_eq!(parse_range_start("12-99").unwrap(), 12);
    }

    #[test]
    fn content_range_header_value() {
        let range = ContentRange::new(0, 327_680, 1_000_000);
        assert_eq!(range.to_string(), "bytes 0-327679/1000000");
        assert_eq!(range.len(), 327_680);
        assert!(!range.is_final());

        let last = ContentRange::new(983_040, 16_960, 1_000_000);
        assert_eq!(last.to_string(), "bytes 983040-999999/1000000");
        assert!(last.is_final());
    }
}
