// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two-phase upload manager.

use bytes::{BufMut, Bytes, BytesMut};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;

use rcs_observe::engine_metrics;

use crate::auth::HttpAuthenticationAgent;
use crate::{HttpClient, HttpRequest, HttpResponse, UploadError};

/// Maximum number of retries across both phases (so four attempts total).
pub const RETRY_MAX: u32 = 3;

const BOUNDARY_TAG: &str = "boundary1";
const TWO_HYPHENS: &str = "--";
const LINE_END: &str = "\r\n";

/// Bound on the file slices fed to the body with progress callbacks.
const CHUNK_MAX_SIZE: usize = 8 * 1024;

/// Observer of upload progress.
pub trait UploadListener: Send + Sync {
    fn on_progress(&self, transferred: u64, total: u64);
}

/// Listener that ignores progress.
#[derive(Debug, Default)]
pub struct NoopUploadListener;

impl UploadListener for NoopUploadListener {
    fn on_progress(&self, _transferred: u64, _total: u64) {}
}

/// File payload to upload.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub name: SmolStr,
    pub mime_type: SmolStr,
    pub data: Bytes,
}

impl FileContent {
    pub fn new(name: &str, mime_type: &str, data: impl Into<Bytes>) -> Self {
        Self {
            name: SmolStr::new(name),
            mime_type: SmolStr::new(mime_type),
            data: data.into(),
        }
    }
}

/// Authentication requirement learned in phase 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Required,
    NotRequired,
}

/// Uploads one file (and optional thumbnail) through the two-phase
/// protocol. One manager instance serves one transfer.
pub struct HttpUploadManager {
    client: Arc<dyn HttpClient>,
    server_url: SmolStr,
    username: SmolStr,
    password: SmolStr,
    content: FileContent,
    thumbnail: Option<Bytes>,
    listener: Arc<dyn UploadListener>,
    /// Transfer id correlating both phases
    tid: SmolStr,
}

impl HttpUploadManager {
    pub fn new(
        client: Arc<dyn HttpClient>,
        server_url: &str,
        username: &str,
        password: &str,
        content: FileContent,
        thumbnail: Option<Bytes>,
        listener: Arc<dyn UploadListener>,
    ) -> Self {
        let tid: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self {
            client,
            server_url: SmolStr::new(server_url),
            username: SmolStr::new(username),
            password: SmolStr::new(password),
            content,
            thumbnail,
            listener,
            tid: SmolStr::new(tid),
        }
    }

    pub fn tid(&self) -> &SmolStr {
        &self.tid
    }

    /// Runs the upload; the result document body announces the file.
    ///
    /// Each attempt is phase 1 (identify) then phase 2 (payload); a 503 with
    /// `Retry-After` sleeps before the next attempt. Attempts stop after
    /// [`RETRY_MAX`] retries.
    pub async fn upload_file(&self) -> Result<Bytes, UploadError> {
        tracing::debug!(file = %self.content.name, size = self.content.data.len(), "upload file");
        let mut retry_count = 0u32;
        let mut last_status = None;

        loop {
            match self.attempt().await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retry { status, backoff }) => {
                    last_status = status.or(last_status);
                    if let Some(backoff) = backoff {
                        tracing::debug!(secs = backoff.as_secs(), "server busy; honoring retry-after");
                        tokio::time::sleep(backoff).await;
                    }
                    if retry_count < RETRY_MAX {
                        retry_count += 1;
                        engine_metrics().on_upload_retry(retry_count);
                        tracing::debug!(retry = retry_count, "retrying upload");
                    } else {
                        return Err(UploadError::RetriesExhausted { last_status });
                    }
                }
            }
        }
    }

    async fn attempt(&self) -> Result<Bytes, AttemptError> {
        // Phase 1: identify the transfer, discover authentication
        let identify = HttpRequest::new(&self.server_url)
            .with_header("Content-Disposition", "form-data; name=\"tid\"")
            .with_header("Content-Type", "text/plain")
            .with_body(Bytes::from(self.tid.to_string()));

        let response = match self.client.post(identify).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "first post failed");
                return Err(AttemptError::Retry {
                    status: None,
                    backoff: None,
                });
            }
        };
        tracing::debug!(status = response.status, "first post response");

        let auth = match response.status {
            401 => AuthState::Required,
            204 => AuthState::NotRequired,
            503 => {
                return Err(AttemptError::Retry {
                    status: Some(503),
                    backoff: response.retry_after_secs().map(Duration::from_secs),
                })
            }
            status => {
                return Err(AttemptError::Retry {
                    status: Some(status),
                    backoff: None,
                })
            }
        };

        // Phase 2: multipart payload
        self.send_multipart(auth, &response).await
    }

    async fn send_multipart(
        &self,
        auth: AuthState,
        challenge_response: &HttpResponse,
    ) -> Result<Bytes, AttemptError> {
        let body = self.build_multipart_body();
        let mut request = HttpRequest::new(&self.server_url)
            .with_header(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", BOUNDARY_TAG),
            )
            .with_header("Content-Length", &body.len().to_string())
            .with_body(body);

        if auth == AuthState::Required {
            let challenge = challenge_response
                .header("WWW-Authenticate")
                .ok_or_else(|| {
                    AttemptError::Fatal(UploadError::AuthFailure(
                        "401 response without challenge".to_owned(),
                    ))
                })?;
            let mut agent = HttpAuthenticationAgent::new(&self.username, &self.password);
            agent
                .read_www_authenticate(challenge)
                .map_err(AttemptError::Fatal)?;
            let authorization = agent
                .authorization_header("POST", self.url_path())
                .map_err(AttemptError::Fatal)?;
            request = request.with_header("Authorization", &authorization);
        }

        let response = match self.client.post(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "second post failed");
                return Err(AttemptError::Retry {
                    status: None,
                    backoff: None,
                });
            }
        };
        tracing::debug!(status = response.status, "second post response");

        match response.status {
            200 => Ok(response.body),
            503 => Err(AttemptError::Retry {
                status: Some(503),
                backoff: response.retry_after_secs().map(Duration::from_secs),
            }),
            status => Err(AttemptError::Retry {
                status: Some(status),
                backoff: None,
            }),
        }
    }

    /// Multipart form: `tid`, optional `Thumbnail`, then the file content
    /// appended in bounded slices with progress callbacks.
    fn build_multipart_body(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(self.content.data.len() + 1024);

        // tid part
        body.put_slice(part_open().as_bytes());
        body.put_slice(b"Content-Disposition: form-data; name=\"tid\"\r\n");
        body.put_slice(b"Content-Type: text/plain\r\n");
        body.put_slice(format!("Content-Length: {}\r\n\r\n", self.tid.len()).as_bytes());
        body.put_slice(self.tid.as_bytes());
        body.put_slice(LINE_END.as_bytes());

        // Thumbnail part
        if let Some(thumbnail) = &self.thumbnail {
            body.put_slice(part_open().as_bytes());
            body.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"Thumbnail\"; filename=\"thumb_{}\"\r\n",
                    self.content.name
                )
                .as_bytes(),
            );
            body.put_slice(format!("Content-Type: {}\r\n", self.content.mime_type).as_bytes());
            body.put_slice(format!("Content-Length: {}\r\n\r\n", thumbnail.len()).as_bytes());
            body.put_slice(thumbnail);
            body.put_slice(LINE_END.as_bytes());
        }

        // File part, streamed in bounded chunks
        body.put_slice(part_open().as_bytes());
        body.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"File\"; filename=\"{}\"\r\n",
                self.content.name
            )
            .as_bytes(),
        );
        body.put_slice(format!("Content-Type: {}\r\n", self.content.mime_type).as_bytes());
        body.put_slice(format!("Content-Length: {}\r\n\r\n", self.content.data.len()).as_bytes());

        let total = self.content.data.len() as u64;
        let mut transferred = 0u64;
        for chunk in self.content.data.chunks(CHUNK_MAX_SIZE) {
            body.put_slice(chunk);
            transferred += chunk.len() as u64;
            self.listener.on_progress(transferred, total);
        }
        body.put_slice(LINE_END.as_bytes());

        // Closing delimiter
        body.put_slice(format!("{}{}{}", TWO_HYPHENS, BOUNDARY_TAG, TWO_HYPHENS).as_bytes());
        body.freeze()
    }

    fn url_path(&self) -> &str {
        let url = self.server_url.as_str();
        url.find("://")
            .and_then(|scheme_end| {
                url[scheme_end + 3..]
                    .find('/')
                    .map(|path_start| &url[scheme_end + 3 + path_start..])
            })
            .unwrap_or("/")
    }
}

fn part_open() -> String {
    format!("{}{}{}", TWO_HYPHENS, BOUNDARY_TAG, LINE_END)
}

enum AttemptError {
    /// Try again (bounded), optionally after a server-mandated backoff
    Retry {
        status: Option<u16>,
        backoff: Option<Duration>,
    },
    Fatal(UploadError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    struct ScriptedClient {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn new(mut responses: Vec<HttpResponse>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn post(&self, request: HttpRequest) -> Result<HttpResponse, crate::HttpError> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop()
                .ok_or_else(|| crate::HttpError("script exhausted".to_owned()))
        }
    }

    fn manager(client: Arc<ScriptedClient>) -> HttpUploadManager {
        HttpUploadManager::new(
            client,
            "https://ft.example.com/upload",
            "alice",
            "secret",
            FileContent::new("photo.jpg", "image/jpeg", Bytes::from(vec![7u8; 20_000])),
            Some(Bytes::from_static(b"thumb-bytes")),
            Arc::new(NoopUploadListener),
        )
    }

    fn result_document() -> String {
        rcs_core::FileTransferHttpInfo {
            file_size: 20_000,
            content_type: smol_str::SmolStr::new("image/jpeg"),
            url: smol_str::SmolStr::new("https://ft.example.com/get/photo"),
            validity: smol_str::SmolStr::new("2026-09-01T00:00:00Z"),
            thumbnail: None,
        }
        .to_xml()
    }

    fn ok_result() -> HttpResponse {
        HttpResponse::new(200).with_body(Bytes::from(result_document().into_bytes()))
    }

    #[tokio::test]
    async fn no_auth_upload_succeeds() {
        let client = ScriptedClient::new(vec![HttpResponse::new(204), ok_result()]);
        let manager = manager(client.clone());

        let result = manager.upload_file().await.unwrap();
        // The body is the file-info document announced to the peer
        let info = rcs_core::parse_file_info(&result).unwrap();
        assert_eq!(info.file_size, 20_000);
        assert_eq!(info.url.as_str(), "https://ft.example.com/get/photo");
        assert_eq!(client.request_count(), 2);

        let requests = client.requests.lock();
        // Phase 1 carries the tid as its body
        assert_eq!(requests[0].body, Bytes::from(manager.tid().to_string()));
        // Phase 2 is the multipart payload, without Authorization
        let body = String::from_utf8_lossy(&requests[1].body);
        assert!(body.contains("name=\"tid\""));
        assert!(body.contains("name=\"Thumbnail\""));
        assert!(body.contains("name=\"File\""));
        assert!(body.ends_with("--boundary1--"));
        assert!(requests[1].header("Authorization").is_none());
    }

    #[tokio::test]
    async fn auth_required_upload_attaches_digest() {
        let challenge = HttpResponse::new(401).with_header(
            "WWW-Authenticate",
            "Digest realm=\"ftcontentserver.rcs\", nonce=\"n1\", qop=\"auth\"",
        );
        let client = ScriptedClient::new(vec![challenge, ok_result()]);
        let manager = manager(client.clone());

        manager.upload_file().await.unwrap();

        let requests = client.requests.lock();
        let auth = requests[1].header("Authorization").unwrap();
        assert!(auth.contains("username=\"alice\""));
        assert!(auth.contains("uri=\"/upload\""));
    }

    #[tokio::test]
    async fn missing_challenge_is_auth_failure() {
        let client = ScriptedClient::new(vec![HttpResponse::new(401)]);
        let manager = manager(client);
        assert!(matches!(
            manager.upload_file().await,
            Err(UploadError::AuthFailure(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn three_503s_with_retry_after_then_success() {
        let busy = || HttpResponse::new(503).with_header("Retry-After", "2");
        let client = ScriptedClient::new(vec![
            busy(),
            busy(),
            busy(),
            HttpResponse::new(204),
            ok_result(),
        ]);
        let manager = manager(client.clone());

        let started = Instant::now();
        let result = manager.upload_file().await;
        assert!(result.is_ok());
        // Three busy responses each slept the advertised two seconds
        assert!(started.elapsed() >= Duration::from_secs(4));
        // 3 identify attempts answered 503, then identify + payload
        assert_eq!(client.request_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn four_503s_exhaust_the_retry_budget() {
        let busy = || HttpResponse::new(503).with_header("Retry-After", "2");
        let client = ScriptedClient::new(vec![busy(), busy(), busy(), busy()]);
        let manager = manager(client.clone());

        let result = manager.upload_file().await;
        assert_eq!(
            result,
            Err(UploadError::RetriesExhausted {
                last_status: Some(503)
            })
        );
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn phase_two_errors_are_retried() {
        let client = ScriptedClient::new(vec![
            HttpResponse::new(204),
            HttpResponse::new(500),
            HttpResponse::new(204),
            ok_result(),
        ]);
        let manager = manager(client.clone());
        assert!(manager.upload_file().await.is_ok());
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn progress_callbacks_cover_the_file() {
        struct CountingListener(Mutex<Vec<(u64, u64)>>);
        impl UploadListener for CountingListener {
            fn on_progress(&self, transferred: u64, total: u64) {
                self.0.lock().push((transferred, total));
            }
        }

        let listener = Arc::new(CountingListener(Mutex::new(Vec::new())));
        let client = ScriptedClient::new(vec![HttpResponse::new(204), ok_result()]);
        let manager = HttpUploadManager::new(
            client,
            "https://ft.example.com/upload",
            "alice",
            "secret",
            FileContent::new("photo.jpg", "image/jpeg", Bytes::from(vec![1u8; 20_000])),
            None,
            listener.clone(),
        );

        manager.upload_file().await.unwrap();
        let calls = listener.0.lock();
        // 20 000 bytes in 8 KiB chunks: 3 callbacks, last one complete
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.last(), Some(&(20_000, 20_000)));
    }
}
