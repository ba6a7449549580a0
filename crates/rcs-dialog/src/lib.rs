// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-session signaling dialog state.
//!
//! A [`DialogPath`] tracks one session's transactional identity: call-id,
//! local/remote tags, sequence counter, target and party URIs, route set, and
//! negotiated content. The sequence counter increments by exactly one for
//! every in-dialog request and never resets; callers that share a dialog
//! (e.g. REFER-based participant addition) must serialize increments through
//! a single owner.
//!
//! # State machine
//! ```text
//! Initial ──invite──▶ SignalingEstablished ──ack──▶ SessionEstablished
//!    │                        │                           │
//!    └──cancel──▶ Cancelled ◀─┘                           └──bye/error──▶ Terminated
//! ```
//! `Cancelled` is terminal and reachable only before session establishment.

use dashmap::DashMap;
use rcs_core::{generate_call_id, generate_tag, SipUri};
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

/// Dialog lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    /// Created, invite not yet answered
    Initial,
    /// Invite answered at the signaling level (final response sent/received)
    SignalingEstablished,
    /// Session confirmed (ACK exchanged)
    SessionEstablished,
    /// Cancelled before establishment; terminal
    Cancelled,
    /// Closed by BYE or error; terminal
    Terminated,
}

impl DialogState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DialogState::Cancelled | DialogState::Terminated)
    }
}

/// Dialog-related errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// Transition not allowed from the current state
    InvalidTransition {
        from: DialogState,
        to: DialogState,
    },
    /// Dialog not found in the registry
    NotFound,
}

impl fmt::Display for DialogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogError::InvalidTransition { from, to } => {
                write!(f, "invalid dialog transition {:?} -> {:?}", from, to)
            }
            DialogError::NotFound => write!(f, "dialog not found"),
        }
    }
}

impl std::error::Error for DialogError {}

/// One signaling session's transactional state.
#[derive(Debug, Clone)]
pub struct DialogPath {
    /// Call identifier
    pub call_id: SmolStr,
    /// Local dialog tag
    pub local_tag: SmolStr,
    /// Remote dialog tag, learned from the peer's response/request
    pub remote_tag: Option<SmolStr>,
    /// Request sequence counter for requests we send
    cseq: u32,
    /// Request target
    pub target: SipUri,
    /// Local party URI
    pub local_party: SipUri,
    /// Remote party URI
    pub remote_party: SipUri,
    /// Route set for in-dialog requests
    pub route_set: Vec<SipUri>,
    /// Local negotiated content (SDP or multipart)
    pub local_content: Option<String>,
    /// Remote negotiated content
    pub remote_content: Option<String>,
    state: DialogState,
}

impl DialogPath {
    /// Creates a dialog path for an outgoing session.
    pub fn originating(
        target: SipUri,
        local_party: SipUri,
        remote_party: SipUri,
        route_set: Vec<SipUri>,
    ) -> Self {
        Self {
            call_id: generate_call_id(),
            local_tag: generate_tag(),
            remote_tag: None,
            cseq: 1,
            target,
            local_party,
            remote_party,
            route_set,
            local_content: None,
            remote_content: None,
            state: DialogState::Initial,
        }
    }

    /// Creates a dialog path from an incoming invite.
    pub fn terminating(
        call_id: impl Into<SmolStr>,
        remote_tag: impl Into<SmolStr>,
        cseq: u32,
        target: SipUri,
        local_party: SipUri,
        remote_party: SipUri,
        route_set: Vec<SipUri>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: generate_tag(),
            remote_tag: Some(remote_tag.into()),
            cseq,
            target,
            local_party,
            remote_party,
            route_set,
            local_content: None,
            remote_content: None,
            state: DialogState::Initial,
        }
    }

    /// Forks a copy for an out-of-dialog request sharing the same target,
    /// with a fresh call-id, tag and sequence counter.
    pub fn fork(&self) -> Self {
        Self {
            call_id: generate_call_id(),
            local_tag: generate_tag(),
            remote_tag: None,
            cseq: 1,
            target: self.target.clone(),
            local_party: self.local_party.clone(),
            remote_party: self.remote_party.clone(),
            route_set: self.route_set.clone(),
            local_content: None,
            remote_content: None,
            state: DialogState::Initial,
        }
    }

    /// Returns the current sequence counter.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Increments the sequence counter by exactly one and returns it.
    pub fn increment_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    /// Returns the current state.
    pub fn state(&self) -> DialogState {
        self.state
    }

    /// Sets the remote tag learned from a response or request.
    pub fn set_remote_tag(&mut self, tag: impl Into<SmolStr>) {
        self.remote_tag = Some(tag.into());
    }

    pub fn set_local_content(&mut self, content: impl Into<String>) {
        self.local_content = Some(content.into());
    }

    pub fn set_remote_content(&mut self, content: impl Into<String>) {
        self.remote_content = Some(content.into());
    }

    /// Marks the signaling as established (final response exchanged).
    pub fn signaling_established(&mut self) -> Result<(), DialogError> {
        self.transition(DialogState::SignalingEstablished)
    }

    /// Marks the session as established (ACK exchanged).
    pub fn session_established(&mut self) -> Result<(), DialogError> {
        self.transition(DialogState::SessionEstablished)
    }

    /// Marks the dialog as cancelled; only valid before establishment.
    pub fn cancelled(&mut self) -> Result<(), DialogError> {
        self.transition(DialogState::Cancelled)
    }

    /// Marks the dialog as terminated.
    pub fn terminated(&mut self) -> Result<(), DialogError> {
        self.transition(DialogState::Terminated)
    }

    fn transition(&mut self, to: DialogState) -> Result<(), DialogError> {
        let allowed = match (self.state, to) {
            (DialogState::Initial, DialogState::SignalingEstablished) => true,
            (DialogState::SignalingEstablished, DialogState::SessionEstablished) => true,
            (DialogState::Initial, DialogState::Cancelled) => true,
            (DialogState::SignalingEstablished, DialogState::Cancelled) => true,
            (DialogState::Initial, DialogState::Terminated) => true,
            (DialogState::SignalingEstablished, DialogState::Terminated) => true,
            (DialogState::SessionEstablished, DialogState::Terminated) => true,
            _ => false,
        };
        if !allowed {
            return Err(DialogError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Concurrent registry of dialog paths keyed by call-id.
pub struct DialogRegistry {
    dialogs: Arc<DashMap<SmolStr, DialogPath>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self {
            dialogs: Arc::new(DashMap::new()),
        }
    }

    /// Inserts or replaces a dialog.
    pub fn insert(&self, dialog: DialogPath) {
        self.dialogs.insert(dialog.call_id.clone(), dialog);
    }

    /// Retrieves a dialog by call-id.
    pub fn get(&self, call_id: &str) -> Option<DialogPath> {
        self.dialogs.get(call_id).map(|entry| entry.clone())
    }

    /// Removes a dialog by call-id.
    pub fn remove(&self, call_id: &str) -> Option<DialogPath> {
        self.dialogs.remove(call_id).map(|(_, dialog)| dialog)
    }

    /// Returns the count of registered dialogs.
    pub fn count(&self) -> usize {
        self.dialogs.len()
    }

    /// Removes every dialog in a terminal state.
    pub fn cleanup_terminal(&self) {
        self.dialogs.retain(|_, dialog| !dialog.state().is_terminal());
    }
}

impl Default for DialogRegistry {
    fn default() -> Self {
        Self::new()
    }
}
