// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! File transfer over HTTP: the resilient two-phase upload protocol.
//!
//! Phase 1 identifies the transfer (`tid`) and discovers whether the server
//! wants authentication; phase 2 posts the multipart payload (tid, optional
//! thumbnail, file content in bounded chunks with progress callbacks). Both
//! phases honor `Retry-After` on 503 and share one bounded retry budget.
//! The successful response body is the file-info document announced to the
//! peer over the chat session.
//!
//! The HTTP POST primitive is a collaborator behind [`HttpClient`].

use async_trait::async_trait;
use bytes::Bytes;
use smol_str::SmolStr;
use std::fmt;

pub mod auth;
pub mod upload;

pub use auth::HttpAuthenticationAgent;
pub use upload::{FileContent, HttpUploadManager, NoopUploadListener, UploadListener, RETRY_MAX};

/// Transport-level HTTP failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError(pub String);

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http error: {}", self.0)
    }
}

impl std::error::Error for HttpError {}

/// An outbound POST request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: SmolStr,
    pub headers: Vec<(SmolStr, SmolStr)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: SmolStr::new(url),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((SmolStr::new(name), SmolStr::new(value)));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response as seen by the upload protocol.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(SmolStr, SmolStr)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((SmolStr::new(name), SmolStr::new(value)));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses the Retry-After header as whole seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("Retry-After")?.trim().parse::<u64>().ok()
    }
}

/// HTTP POST primitive consumed by the upload manager.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Upload failure taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The 401 challenge was missing or unusable
    AuthFailure(String),
    /// The bounded retry budget ran out
    RetriesExhausted { last_status: Option<u16> },
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::AuthFailure(msg) => write!(f, "upload auth failure: {}", msg),
            UploadError::RetriesExhausted { last_status } => {
                write!(f, "upload retries exhausted (last status {:?})", last_status)
            }
        }
    }
}

impl std::error::Error for UploadError {}
