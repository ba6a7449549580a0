// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-process MSRP transport pair.
//!
//! Two cross-connected endpoints exchanging chunks over channels, with
//! scriptable send failures. Used by the engine's tests in place of the real
//! socket transport.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{MsrpChunk, MsrpChunkKind, MsrpError, MsrpEvent, MsrpTransport};

/// One endpoint of an in-process transport pair.
pub struct MemoryTransport {
    /// Chunks sent by this endpoint land on the peer's event channel
    peer_events: mpsc::UnboundedSender<MsrpEvent>,
    /// This endpoint's own event channel (for progress/error reporting)
    own_events: mpsc::UnboundedSender<MsrpEvent>,
    open: Mutex<bool>,
    /// Status codes to fail the next sends with, in order
    scripted_failures: Mutex<Vec<u16>>,
}

impl MemoryTransport {
    /// Scripts the next send to fail with the given MSRP status.
    pub fn fail_next_send(&self, status: u16) {
        self.scripted_failures.lock().push(status);
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }
}

/// Creates a cross-connected transport pair. Chunks sent on one endpoint
/// arrive as [`MsrpEvent::DataReceived`] on the other endpoint's channel.
pub fn memory_pair(
    events_a: mpsc::UnboundedSender<MsrpEvent>,
    events_b: mpsc::UnboundedSender<MsrpEvent>,
) -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
    let a = Arc::new(MemoryTransport {
        peer_events: events_b.clone(),
        own_events: events_a.clone(),
        open: Mutex::new(false),
        scripted_failures: Mutex::new(Vec::new()),
    });
    let b = Arc::new(MemoryTransport {
        peer_events: events_a,
        own_events: events_b,
        open: Mutex::new(false),
        scripted_failures: Mutex::new(Vec::new()),
    });
    (a, b)
}

#[async_trait]
impl MsrpTransport for MemoryTransport {
    async fn open(&self) -> Result<(), MsrpError> {
        *self.open.lock() = true;
        Ok(())
    }

    async fn send_chunk(&self, chunk: MsrpChunk) -> Result<(), MsrpError> {
        if !*self.open.lock() {
            return Err(MsrpError::NotOpen);
        }

        // A scripted failure surfaces synchronously, like a local send
        // rejection; asynchronous failures are injected by tests directly
        // on the event channel.
        let failure = self.scripted_failures.lock().pop();
        if let Some(status) = failure {
            return Err(MsrpError::SendRejected { status });
        }

        // Keep-alive chunks open the path but carry nothing
        if chunk.kind == MsrpChunkKind::Empty {
            return Ok(());
        }

        let total = chunk.data.len() as u64;
        let _ = self.own_events.send(MsrpEvent::TransferProgress {
            current: total,
            total,
        });
        let _ = self.peer_events.send(MsrpEvent::DataReceived {
            message_id: chunk.message_id.clone(),
            mime_type: chunk.mime_type.clone(),
            data: chunk.data.clone(),
        });
        let _ = self.own_events.send(MsrpEvent::MessageSent {
            message_id: chunk.message_id,
        });
        Ok(())
    }

    async fn close(&self) {
        let mut open = self.open.lock();
        if *open {
            *open = false;
            let _ = self.own_events.send(MsrpEvent::Closed);
        }
    }
}
