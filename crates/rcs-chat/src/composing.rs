// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Remote composing-state tracking.
//!
//! Feeds on isComposing documents from the peer and expires a stale active
//! state when the advertised refresh interval elapses without a new event.

use parking_lot::Mutex;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;

use rcs_core::parse_is_composing;

/// Fallback expiry when the peer does not advertise a refresh interval.
const DEFAULT_EXPIRY: Duration = Duration::from_secs(120);

/// Tracks the remote party's composing state.
pub struct ComposingTracker {
    state: Mutex<State>,
    on_change: Box<dyn Fn(&str, bool) + Send + Sync>,
}

struct State {
    active: bool,
    contact: Option<SmolStr>,
    generation: u64,
}

impl ComposingTracker {
    /// `on_change(contact, active)` runs on every state flip.
    pub fn new(on_change: impl Fn(&str, bool) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                active: false,
                contact: None,
                generation: 0,
            }),
            on_change: Box::new(on_change),
        })
    }

    /// Feeds a raw isComposing document. Malformed documents are logged and
    /// dropped without disturbing the current state.
    pub fn receive_event(self: &Arc<Self>, contact: &str, document: &[u8]) {
        match parse_is_composing(document) {
            Ok(info) => {
                let expiry = info.refresh.unwrap_or(DEFAULT_EXPIRY);
                self.set_state(contact, info.active, Some(expiry));
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed is-composing document");
            }
        }
    }

    /// Forces the state (used when a message arrival implies composing ended).
    pub fn set_idle(self: &Arc<Self>, contact: &str) {
        self.set_state(contact, false, None);
    }

    /// Returns the currently tracked state.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    fn set_state(self: &Arc<Self>, contact: &str, active: bool, expiry: Option<Duration>) {
        let generation;
        let changed;
        {
            let mut state = self.state.lock();
            changed = state.active != active;
            state.active = active;
            state.contact = Some(SmolStr::new(contact));
            state.generation += 1;
            generation = state.generation;
        }
        if changed {
            (self.on_change)(contact, active);
        }

        // A fresh active state expires on its own unless renewed
        if active {
            if let Some(expiry) = expiry {
                let tracker = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(expiry).await;
                    tracker.expire(generation);
                });
            }
        }
    }

    fn expire(self: &Arc<Self>, generation: u64) {
        let contact;
        {
            let mut state = self.state.lock();
            if state.generation != generation || !state.active {
                return;
            }
            state.active = false;
            contact = state.contact.clone();
        }
        if let Some(contact) = contact {
            (self.on_change)(&contact, false);
        }
    }
}
