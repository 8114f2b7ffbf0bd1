//! Graph drive client.
//!
//! Async HTTP client using `reqwest`. Session creation and item lookups carry
//! a bearer token; chunk, status and commit calls go to the pre-authorized
//! upload URL without one.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, trace};

use skyupload_protocol::constants::{DEFAULT_REQUEST_TIMEOUT, GRAPH_BASE_URL};
use skyupload_protocol::{
    ChunkUploadResult, ContentRange, CreateUploadSessionRequest, DriveItem, PendingUpload,
    ProtocolError, UploadSession,
};

use crate::error::Error;
use crate::transport::{TokenProvider, TransportFuture, UploadTransport};

/// Characters escaped in a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Drive API client implementing [`UploadTransport`].
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
}

impl GraphClient {
    /// Creates a client that authenticates with `tokens`.
    pub fn new(tokens: impl TokenProvider + 'static) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("skyupload/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: GRAPH_BASE_URL.to_string(),
            tokens: Arc::new(tokens),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Sets a custom API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the timeout applied to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/me/drive/items/{folder_id}:/{name}:`
    fn item_path_url(&self, folder_id: &str, name: &str) -> String {
        format!(
            "{}/me/drive/items/{}:/{}:",
            self.base_url,
            utf8_percent_encode(folder_id, PATH_SEGMENT),
            utf8_percent_encode(name, PATH_SEGMENT)
        )
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, Error> {
        let token = self.tokens.access_token().await?;
        Ok(builder.bearer_auth(token))
    }

    /// Sends a request, turning non-2xx responses into [`Error::Api`].
    async fn send(&self, builder: RequestBuilder) -> Result<Response, Error> {
        let resp = builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }
}

async fn read_body(resp: Response) -> Result<Bytes, Error> {
    resp.bytes().await.map_err(map_reqwest)
}

fn map_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

impl UploadTransport for GraphClient {
    fn create_upload_session<'a>(
        &'a self,
        folder_id: &'a str,
        request: &'a CreateUploadSessionRequest,
    ) -> TransportFuture<'a, UploadSession> {
        Box::pin(async move {
            let url = format!(
                "{}/createUploadSession",
                self.item_path_url(folder_id, &request.item.name)
            );
            debug!(folder = %folder_id, name = %request.item.name, "creating upload session");

            let builder = self.authorized(self.http.post(&url).json(request)).await?;
            let body = read_body(self.send(builder).await?).await?;
            let mut session: UploadSession =
                serde_json::from_slice(&body).map_err(ProtocolError::from)?;
            session.deferred_commit = request.defer_commit;
            Ok(session)
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        upload_url: &'a str,
        range: ContentRange,
        body: Bytes,
    ) -> TransportFuture<'a, ChunkUploadResult> {
        Box::pin(async move {
            trace!(range = %range, "sending chunk");
            let builder = self
                .http
                .put(upload_url)
                .header(CONTENT_RANGE, range.to_string())
                .header(CONTENT_LENGTH, body.len())
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(body);
            let body = read_body(self.send(builder).await?).await?;
            Ok(ChunkUploadResult::from_slice(&body)?)
        })
    }

    fn upload_status<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, PendingUpload> {
        Box::pin(async move {
            let body = read_body(self.send(self.http.get(upload_url)).await?).await?;
            Ok(serde_json::from_slice(&body).map_err(ProtocolError::from)?)
        })
    }

    fn commit<'a>(&'a self, upload_url: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let resp = self
                .http
                .post(upload_url)
                .header(CONTENT_LENGTH, 0)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(map_reqwest)?;
            let status = resp.status();
            if status != StatusCode::CREATED {
                return Err(Error::CommitFailed {
                    status: status.as_u16(),
                });
            }
            debug!("upload session committed");
            Ok(())
        })
    }

    fn get_item<'a>(&'a self, folder_id: &'a str, name: &'a str) -> TransportFuture<'a, DriveItem> {
        Box::pin(async move {
            let url = self.item_path_url(folder_id, name);
            let builder = self.authorized(self.http.get(&url)).await?;
            let body = read_body(self.send(builder).await?).await?;
            Ok(serde_json::from_slice(&body).map_err(ProtocolError::from)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::StaticToken;
    use skyupload_protocol::{ConflictBehavior, UploadItemProperties};
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// A request as seen by the mock server.
    #[derive(Debug, Default)]
    struct Captured {
        request_line: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    }

    /// Reads one HTTP/1.1 request, including its `Content-Length` body.
    async fn read_request(stream: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return Captured::default();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let content_length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = buf[header_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Captured {
            request_line,
            headers,
            body,
        }
    }

    /// Starts a mock HTTP server that answers one request with `status` and `body`.
    async fn mock_server(
        status: u16,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let captured = read_request(&mut stream).await;

            let resp = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            captured
        });

        (url, handle)
    }

    fn client(url: &str) -> GraphClient {
        GraphClient::new(StaticToken::new("test-token"))
            .unwrap()
            .with_base_url(url)
    }

    fn session_request(name: &str, defer_commit: bool) -> CreateUploadSessionRequest {
        CreateUploadSessionRequest {
            item: UploadItemProperties {
                conflict_behavior: ConflictBehavior::Rename,
                name: name.into(),
                file_size: 10,
                description: None,
            },
            defer_commit,
        }
    }

    #[tokio::test]
    async fn create_session_posts_authorized_request() {
        let json = r#"{"uploadUrl":"https://up.example/s1","expirationDateTime":"2030-01-01T00:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        let request = session_request("my video.mp4", true);
        let session = client(&url)
            .create_upload_session("root", &request)
            .await
            .unwrap();
        assert_eq!(session.upload_url, "https://up.example/s1");
        assert!(session.deferred_commit);

        let captured = handle.await.unwrap();
        assert_eq!(
            captured.request_line,
            "POST /me/drive/items/root:/my%20video.mp4:/createUploadSession HTTP/1.1"
        );
        assert_eq!(
            captured.headers.get("authorization").map(String::as_str),
            Some("Bearer test-token")
        );
        let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
        assert_eq!(body["item"]["@microsoft.graph.conflictBehavior"], "rename");
        assert_eq!(body["item"]["fileSize"], 10);
        assert_eq!(body["deferCommit"], true);
    }

    #[tokio::test]
    async fn create_session_auth_error() {
        let (url, handle) =
            mock_server(401, r#"{"error":{"code":"InvalidAuthenticationToken"}}"#).await;

        let err = client(&url)
            .create_upload_session("root", &session_request("a.bin", false))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("401"), "{err}");

        handle.abort();
    }

    #[tokio::test]
    async fn upload_chunk_sends_range_without_token() {
        let json = r#"{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["5-"]}"#;
        let (url, handle) = mock_server(202, json).await;

        let upload_url = format!("{url}/upload/s1");
        let result = client(&url)
            .upload_chunk(
                &upload_url,
                ContentRange::new(0, 5, 10),
                Bytes::from_static(b"hello"),
            )
            .await
            .unwrap();
        let ChunkUploadResult::Pending(pending) = result else {
            panic!("expected pending result");
        };
        assert_eq!(pending.next_expected_start().unwrap(), Some(5));

        let captured = handle.await.unwrap();
        assert_eq!(captured.request_line, "PUT /upload/s1 HTTP/1.1");
        assert_eq!(
            captured.headers.get("content-range").map(String::as_str),
            Some("bytes 0-4/10")
        );
        assert_eq!(
            captured.headers.get("content-length").map(String::as_str),
            Some("5")
        );
        assert_eq!(
            captured.headers.get("content-type").map(String::as_str),
            Some("application/octet-stream")
        );
        assert!(!captured.headers.contains_key("authorization"));
        assert_eq!(captured.body, b"hello");
    }

    #[tokio::test]
    async fn upload_chunk_returns_finished_item() {
        let json = r#"{"id":"item-9","name":"a.bin","size":10,"file":{"hashes":{"quickXorHash":"xyz="}}}"#;
        let (url, handle) = mock_server(201, json).await;

        let upload_url = format!("{url}/upload/s1");
        let result = client(&url)
            .upload_chunk(
                &upload_url,
                ContentRange::new(5, 5, 10),
                Bytes::from_static(b"world"),
            )
            .await
            .unwrap();
        let ChunkUploadResult::Complete(item) = result else {
            panic!("expected complete result");
        };
        assert_eq!(item.id, "item-9");
        assert_eq!(item.quick_xor_hash(), Some("xyz="));

        handle.abort();
    }

    #[tokio::test]
    async fn upload_chunk_server_error_is_transient() {
        let (url, handle) = mock_server(503, "").await;

        let upload_url = format!("{url}/upload/s1");
        let err = client(&url)
            .upload_chunk(&upload_url, ContentRange::new(0, 1, 1), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 503, .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);

        handle.abort();
    }

    #[tokio::test]
    async fn upload_status_reads_expected_ranges() {
        let json = r#"{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["327680-"]}"#;
        let (url, handle) = mock_server(200, json).await;

        let upload_url = format!("{url}/upload/s1");
        let pending = client(&url).upload_status(&upload_url).await.unwrap();
        assert_eq!(pending.next_expected_start().unwrap(), Some(327_680));

        let captured = handle.await.unwrap();
        assert_eq!(captured.request_line, "GET /upload/s1 HTTP/1.1");
        assert!(!captured.headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn commit_requires_created() {
        let (url, handle) = mock_server(201, "{}").await;
        let upload_url = format!("{url}/upload/s1");
        client(&url).commit(&upload_url).await.unwrap();
        let captured = handle.await.unwrap();
        assert_eq!(captured.request_line, "POST /upload/s1 HTTP/1.1");

        let (url, handle) = mock_server(200, "{}").await;
        let upload_url = format!("{url}/upload/s1");
        let err = client(&url).commit(&upload_url).await.unwrap_err();
        assert!(matches!(err, Error::CommitFailed { status: 200 }));
        handle.abort();
    }

    #[tokio::test]
    async fn get_item_looks_up_by_path() {
        let json = r#"{"id":"item-3","name":"report.pdf","size":42}"#;
        let (url, handle) = mock_server(200, json).await;

        let item = client(&url).get_item("folder-1", "report.pdf").await.unwrap();
        assert_eq!(item.id, "item-3");
        assert_eq!(item.size, 42);

        let captured = handle.await.unwrap();
        assert_eq!(
            captured.request_line,
            "GET /me/drive/items/folder-1:/report.pdf: HTTP/1.1"
        );
        assert_eq!(
            captured.headers.get("authorization").map(String::as_str),
            Some("Bearer test-token")
        );
    }

    #[tokio::test]
    async fn get_item_not_found() {
        let (url, handle) = mock_server(404, r#"{"error":{"code":"itemNotFound"}}"#).await;
        let err = client(&url).get_item("root", "missing.txt").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        handle.abort();
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut stream).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let url = format!("http://127.0.0.1:{port}");
        let err = client(&url)
            .with_timeout(Duration::from_millis(100))
            .upload_status(&format!("{url}/upload/s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Transient);

        handle.abort();
    }

    #[test]
    fn item_path_escapes_segments() {
        let c = client("http://localhost/v1.0/");
        assert_eq!(c.base_url(), "http://localhost/v1.0");
        assert_eq!(
            c.item_path_url("root", "a b#c?.txt"),
            "http://localhost/v1.0/me/drive/items/root:/a%20b%23c%3F.txt:"
        );
    }
}
