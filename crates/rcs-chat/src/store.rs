// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator contracts: message store and contact/block-list lookup.
//!
//! Persistent storage lives outside the engine; these traits are the narrow
//! read/write contracts the sessions use. [`InMemoryMessageStore`] backs
//! tests and single-process deployments.

use dashmap::DashMap;
use rcs_core::{DeliveryStatus, ImdnError, InstantMessage};
use smol_str::SmolStr;
use std::collections::HashSet;

/// Message persistence keyed by message id and conversation.
pub trait MessageStore: Send + Sync {
    /// Records (contribution-id, message-id) and returns true when the pair
    /// was unseen. The engine delivers a message to listeners only on the
    /// first sighting.
    fn mark_seen(&self, contribution_id: &str, message_id: &str) -> bool;

    /// Persists a received or sent message.
    fn insert_message(&self, contribution_id: &str, message: &InstantMessage);

    /// Current delivery status of a message, if tracked.
    fn status(&self, message_id: &str) -> Option<DeliveryStatus>;

    /// Applies a status update, enforcing forward-only progression
    /// (sent < delivered < displayed; failed unconditional and terminal).
    fn set_status(
        &self,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryStatus, ImdnError>;

    /// Marks a message as awaiting a displayed report from the consumer.
    fn set_displayed_report_pending(&self, message_id: &str);

    /// True when the message awaits a displayed report.
    fn is_displayed_report_pending(&self, message_id: &str) -> bool;

    /// Participants recorded as connected to a group conversation.
    fn group_connected_participants(&self, contribution_id: &str) -> Vec<SmolStr>;
}

/// Contact-book integration: block-list lookups.
pub trait ContactManager: Send + Sync {
    /// True when incoming file transfers from the contact are blocked.
    fn is_ft_blocked(&self, contact: &str) -> bool;
}

/// Accept-everything contact manager.
#[derive(Debug, Default)]
pub struct PermissiveContactManager;

impl ContactManager for PermissiveContactManager {
    fn is_ft_blocked(&self, _contact: &str) -> bool {
        false
    }
}

/// DashMap-backed store for tests and single-process use.
#[derive(Default)]
pub struct InMemoryMessageStore {
    seen: DashMap<SmolStr, HashSet<SmolStr>>,
    messages: DashMap<SmolStr, InstantMessage>,
    statuses: DashMap<SmolStr, DeliveryStatus>,
    pending_displayed: DashMap<SmolStr, ()>,
    group_participants: DashMap<SmolStr, Vec<SmolStr>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the connected participant list for a group conversation.
    pub fn set_group_connected_participants(
        &self,
        contribution_id: &str,
        participants: Vec<SmolStr>,
    ) {
        self.group_participants
            .insert(SmolStr::new(contribution_id), participants);
    }

    pub fn message(&self, message_id: &str) -> Option<InstantMessage> {
        self.messages.get(message_id).map(|entry| entry.clone())
    }
}

impl MessageStore for InMemoryMessageStore {
    fn mark_seen(&self, contribution_id: &str, message_id: &str) -> bool {
        let mut entry = self
            .seen
            .entry(SmolStr::new(contribution_id))
            .or_default();
        entry.insert(SmolStr::new(message_id))
    }

    fn insert_message(&self, _contribution_id: &str, message: &InstantMessage) {
        self.messages
            .insert(message.message_id.clone(), message.clone());
        self.statuses
            .entry(message.message_id.clone())
            .or_insert(DeliveryStatus::Sent);
    }

    fn status(&self, message_id: &str) -> Option<DeliveryStatus> {
        self.statuses.get(message_id).map(|entry| *entry)
    }

    fn set_status(
        &self,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryStatus, ImdnError> {
        let mut entry = self
            .statuses
            .entry(SmolStr::new(message_id))
            .or_insert(DeliveryStatus::Sent);
        let next = entry.advance(status)?;
        *entry = next;
        Ok(next)
    }

    fn set_displayed_report_pending(&self, message_id: &str) {
        self.pending_displayed.insert(SmolStr::new(message_id), ());
    }

    fn is_displayed_report_pending(&self, message_id: &str) -> bool {
        self.pending_displayed.contains_key(message_id)
    }

    fn group_connected_participants(&self, contribution_id: &str) -> Vec<SmolStr> {
        self.group_participants
            .get(contribution_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_seen_deduplicates_per_conversation() {
        let store = InMemoryMessageStore::new();
        assert!(store.mark_seen("c1", "m1"));
        assert!(!store.mark_seen("c1", "m1"));
        // Same id under another conversation is a different pair
        assert!(store.mark_seen("c2", "m1"));
    }

    #[test]
    fn status_progression_is_forward_only() {
        let store = InMemoryMessageStore::new();
        let msg = InstantMessage::new("m1", "sip:a@x", "hi");
        store.insert_message("c1", &msg);

        store.set_status("m1", DeliveryStatus::Delivered).unwrap();
        store.set_status("m1", DeliveryStatus::Displayed).unwrap();
        assert!(store.set_status("m1", DeliveryStatus::Delivered).is_err());
        assert_eq!(store.status("m1"), Some(DeliveryStatus::Displayed));
    }

    #[test]
    fn failed_is_terminal() {
        let store = InMemoryMessageStore::new();
        store.set_status("m2", DeliveryStatus::Failed).unwrap();
        assert!(store.set_status("m2", DeliveryStatus::Delivered).is_err());
        assert_eq!(store.status("m2"), Some(DeliveryStatus::Failed));
    }

    #[test]
    fn displayed_pending_flag() {
        let store = InMemoryMessageStore::new();
        assert!(!store.is_displayed_report_pending("m1"));
        store.set_displayed_report_pending("m1");
        assert!(store.is_displayed_report_pending("m1"));
    }
}
