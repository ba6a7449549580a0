// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Concurrent session registry.
//!
//! Sessions run as independent tasks; the registry is the only shared table,
//! supporting concurrent insert/remove/lookup by session id.

use dashmap::DashMap;
use smol_str::SmolStr;
use std::sync::Arc;

use crate::session::ChatSession;

/// Registry of live chat sessions keyed by session id (the dialog call-id).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SmolStr, Arc<ChatSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<ChatSession>) {
        self.sessions.insert(session.session_id().clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions.remove(session_id).map(|(_, session)| session)
    }

    /// Finds the session bound to a conversation.
    pub fn find_by_contribution(&self, contribution_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions
            .iter()
            .find(|entry| entry.value().contribution_id().as_str() == contribution_id)
            .map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
