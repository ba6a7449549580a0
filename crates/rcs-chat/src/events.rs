// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed session event bus.
//!
//! Subscribers receive [`ChatEvent`]s over an unbounded channel. Internal
//! state is always updated before events are emitted; fan-out is ordered per
//! subscriber but not synchronous with state mutation.

use parking_lot::Mutex;
use rcs_core::{DeliveryStatus, FileTransferHttpInfo, GeolocMessage, InstantMessage};
use smol_str::SmolStr;
use tokio::sync::mpsc;

use crate::error::ChatError;

/// Why a session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ByUser,
    ByTimeout,
    ByRemote,
    BySystem,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::ByUser => "by-user",
            TerminationReason::ByTimeout => "by-timeout",
            TerminationReason::ByRemote => "by-remote",
            TerminationReason::BySystem => "by-system",
        }
    }
}

/// Events emitted by a chat session.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    SessionStarted,
    SessionAborted {
        reason: TerminationReason,
    },
    MessageReceived(InstantMessage),
    GeolocReceived(GeolocMessage),
    ComposingStateChanged {
        contact: SmolStr,
        active: bool,
    },
    DeliveryStatusChanged {
        message_id: SmolStr,
        status: DeliveryStatus,
        contact: Option<SmolStr>,
    },
    /// A file-transfer-over-HTTP invitation passed the pre-flight checks
    FileTransferInvitation {
        contact: SmolStr,
        message_id: SmolStr,
        info: FileTransferHttpInfo,
    },
    ParticipantAddSucceeded,
    ParticipantAddFailed {
        reason: String,
    },
    Error(ChatError),
}

/// Ordered fan-out of session events to registered subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChatEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its receiving end.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emits an event to every live subscriber, dropping closed ones.
    pub fn emit(&self, event: ChatEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_all_subscribers_in_order() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(ChatEvent::SessionStarted);
        bus.emit(ChatEvent::SessionAborted {
            reason: TerminationReason::ByUser,
        });

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(rx.recv().await.unwrap(), ChatEvent::SessionStarted));
            assert!(matches!(
                rx.recv().await.unwrap(),
                ChatEvent::SessionAborted {
                    reason: TerminationReason::ByUser
                }
            ));
        }
    }

    #[tokio::test]
    async fn closed_subscribers_are_dropped() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.emit(ChatEvent::SessionStarted);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
