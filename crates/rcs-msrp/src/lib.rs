// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! MSRP chunk model and transport seam.
//!
//! The raw socket/TLS plumbing lives below this crate, behind
//! [`MsrpTransport`] and [`MsrpTransportFactory`]. The engine sees typed
//! chunks going out and [`MsrpEvent`]s coming in on a channel; transport
//! callbacks must never block the transport's own processing loop, so events
//! are queued rather than handled inline.
//!
//! [`MsrpManager`] owns at most one open transport per chat session: opening
//! a new one requires the previous to be closed first.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod memory;
pub use memory::{memory_pair, MemoryTransport};

/// What a chunk carries, used for error routing and report fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsrpChunkKind {
    TextMessage,
    IsComposing,
    Geoloc,
    FileInfo,
    DeliveredReport,
    DisplayedReport,
    OtherStatusReport,
    /// Empty keep-alive chunk sent to traverse address translation
    Empty,
}

impl MsrpChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MsrpChunkKind::TextMessage => "text",
            MsrpChunkKind::IsComposing => "is-composing",
            MsrpChunkKind::Geoloc => "geoloc",
            MsrpChunkKind::FileInfo => "file-info",
            MsrpChunkKind::DeliveredReport => "delivered-report",
            MsrpChunkKind::DisplayedReport => "displayed-report",
            MsrpChunkKind::OtherStatusReport => "other-status-report",
            MsrpChunkKind::Empty => "empty",
        }
    }
}

/// One outbound MSRP chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct MsrpChunk {
    pub message_id: SmolStr,
    pub mime_type: SmolStr,
    pub data: Bytes,
    pub kind: MsrpChunkKind,
}

impl MsrpChunk {
    pub fn new(
        message_id: impl Into<SmolStr>,
        mime_type: impl Into<SmolStr>,
        data: impl Into<Bytes>,
        kind: MsrpChunkKind,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            mime_type: mime_type.into(),
            data: data.into(),
            kind,
        }
    }

    /// Builds the empty keep-alive chunk.
    pub fn empty() -> Self {
        Self {
            message_id: SmolStr::default(),
            mime_type: SmolStr::default(),
            data: Bytes::new(),
            kind: MsrpChunkKind::Empty,
        }
    }
}

/// MSRP transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsrpError {
    /// No session is open
    NotOpen,
    /// A session is already open; close it first
    AlreadyOpen,
    /// The peer rejected the chunk with an MSRP status code
    SendRejected { status: u16 },
    /// The underlying connection is gone
    TransportClosed,
    Io(String),
}

impl fmt::Display for MsrpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsrpError::NotOpen => write!(f, "msrp session not open"),
            MsrpError::AlreadyOpen => write!(f, "msrp session already open"),
            MsrpError::SendRejected { status } => {
                write!(f, "msrp chunk rejected with status {}", status)
            }
            MsrpError::TransportClosed => write!(f, "msrp transport closed"),
            MsrpError::Io(msg) => write!(f, "msrp io error: {}", msg),
        }
    }
}

impl std::error::Error for MsrpError {}

/// Transient vs fatal classification of a media-plane fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFault {
    /// Stop sending further chunks of the same message; the session may
    /// still yield more messages (RFC 4975 handling of 408/413)
    Broken,
    /// The session should be torn down
    Failed,
}

/// Classifies an MSRP failure status.
///
/// A 408 must be treated like a local timeout and a 413 stops further chunks
/// of the same message; both leave the session usable. Anything else (e.g.
/// 481, the session no longer exists) is fatal for the session.
pub fn classify_fault(status: Option<u16>) -> MediaFault {
    match status {
        Some(408) | Some(413) => MediaFault::Broken,
        _ => MediaFault::Failed,
    }
}

/// Events delivered asynchronously by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum MsrpEvent {
    /// A complete inbound message
    DataReceived {
        message_id: SmolStr,
        mime_type: SmolStr,
        data: Bytes,
    },
    /// Outbound transfer progress
    TransferProgress { current: u64, total: u64 },
    /// An outbound message was fully transferred
    MessageSent { message_id: SmolStr },
    /// An outbound chunk failed
    TransferError {
        message_id: SmolStr,
        status: Option<u16>,
        kind: MsrpChunkKind,
    },
    /// The transport closed
    Closed,
}

/// Chunked send/receive primitive implemented by the real transport.
#[async_trait]
pub trait MsrpTransport: Send + Sync {
    /// Opens the transport (connects as client or accepts as server).
    async fn open(&self) -> Result<(), MsrpError>;

    /// Sends one chunk. Completion/failure of large transfers is reported
    /// through the event channel, not the return value.
    async fn send_chunk(&self, chunk: MsrpChunk) -> Result<(), MsrpError>;

    /// Closes the transport. Idempotent.
    async fn close(&self);
}

/// Connection role negotiated via the SDP setup attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsrpRole {
    /// We connect to the peer (setup:active)
    Client,
    /// We wait for the peer's connection (setup:passive)
    Server,
}

/// Creates transports once the media negotiation has fixed the role.
pub trait MsrpTransportFactory: Send + Sync {
    /// Creates a client transport toward the peer's advertised path.
    fn create_client(
        &self,
        remote_host: &str,
        remote_port: u16,
        remote_path: &str,
        events: mpsc::UnboundedSender<MsrpEvent>,
    ) -> Arc<dyn MsrpTransport>;

    /// Creates a server transport bound to the local path.
    fn create_server(
        &self,
        local_path: &str,
        events: mpsc::UnboundedSender<MsrpEvent>,
    ) -> Arc<dyn MsrpTransport>;
}

/// Per-session MSRP state: local endpoint identity and the single open
/// transport.
pub struct MsrpManager {
    local_ip: SmolStr,
    local_port: u16,
    secured: bool,
    session_id: SmolStr,
    transport: Mutex<Option<Arc<dyn MsrpTransport>>>,
}

impl MsrpManager {
    pub fn new(local_ip: &str, local_port: u16) -> Self {
        let session_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        Self {
            local_ip: SmolStr::new(local_ip),
            local_port,
            secured: false,
            session_id: SmolStr::new(session_id),
            transport: Mutex::new(None),
        }
    }

    pub fn set_secured(&mut self, secured: bool) {
        self.secured = secured;
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// SDP protocol token for the local socket.
    pub fn local_socket_protocol(&self) -> &'static str {
        if self.secured {
            "TCP/TLS/MSRP"
        } else {
            "TCP/MSRP"
        }
    }

    /// Local MSRP path URI advertised in SDP.
    pub fn local_path(&self) -> String {
        let scheme = if self.secured { "msrps" } else { "msrp" };
        format!(
            "{}://{}:{}/{};tcp",
            scheme, self.local_ip, self.local_port, self.session_id
        )
    }

    /// Installs the session transport.
    ///
    /// At most one transport may be open per session; a second install is
    /// rejected until [`MsrpManager::close_session`] runs.
    pub fn install(&self, transport: Arc<dyn MsrpTransport>) -> Result<(), MsrpError> {
        let mut guard = self.transport.lock();
        if guard.is_some() {
            return Err(MsrpError::AlreadyOpen);
        }
        *guard = Some(transport);
        Ok(())
    }

    fn current(&self) -> Result<Arc<dyn MsrpTransport>, MsrpError> {
        self.transport.lock().clone().ok_or(MsrpError::NotOpen)
    }

    /// Opens the installed transport.
    pub async fn open_session(&self) -> Result<(), MsrpError> {
        self.current()?.open().await
    }

    /// Sends a chunk over the open transport.
    pub async fn send_chunk(&self, chunk: MsrpChunk) -> Result<(), MsrpError> {
        self.current()?.send_chunk(chunk).await
    }

    /// Sends the empty keep-alive chunk to traverse address translation.
    pub async fn send_empty_chunk(&self) -> Result<(), MsrpError> {
        self.current()?.send_chunk(MsrpChunk::empty()).await
    }

    /// Closes and drops the session transport. Idempotent.
    pub async fn close_session(&self) {
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.close().await;
            tracing::debug!("msrp session closed");
        }
    }

    /// Returns true when a transport is installed.
    pub fn is_open(&self) -> bool {
        self.transport.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::memory_pair;

    #[test]
    fn classify_transient_vs_fatal() {
        assert_eq!(classify_fault(Some(408)), MediaFault::Broken);
        assert_eq!(classify_fault(Some(413)), MediaFault::Broken);
        assert_eq!(classify_fault(Some(481)), MediaFault::Failed);
        assert_eq!(classify_fault(Some(500)), MediaFault::Failed);
        assert_eq!(classify_fault(None), MediaFault::Failed);
    }

    #[test]
    fn local_path_reflects_security() {
        let mut manager = MsrpManager::new("10.0.0.1", 20000);
        assert!(manager.local_path().starts_with("msrp://10.0.0.1:20000/"));
        assert_eq!(manager.local_socket_protocol(), "TCP/MSRP");

        manager.set_secured(true);
        assert!(manager.local_path().starts_with("msrps://"));
        assert_eq!(manager.local_socket_protocol(), "TCP/TLS/MSRP");
    }

    #[tokio::test]
    async fn single_open_session_invariant() {
        let manager = MsrpManager::new("10.0.0.1", 20000);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (a, _b) = memory_pair(events_tx.clone(), events_tx.clone());

        manager.install(a.clone()).unwrap();
        let (c, _d) = memory_pair(events_tx.clone(), events_tx);
        assert_eq!(manager.install(c.clone()), Err(MsrpError::AlreadyOpen));

        manager.close_session().await;
        assert!(manager.install(c).is_ok());
    }

    #[tokio::test]
    async fn send_without_session_fails() {
        let manager = MsrpManager::new("10.0.0.1", 20000);
        assert_eq!(
            manager.send_empty_chunk().await,
            Err(MsrpError::NotOpen)
        );
    }
}
