// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Store-and-forward handling.
//!
//! Messages and delivery notifications missed while offline are pushed by
//! the store-and-forward server as terminating sessions. Message sessions
//! behave like one-to-one chats; notification sessions only carry reports
//! and never generate delivery reports of their own.

use std::sync::Arc;

use rcs_core::Request;

use crate::error::ChatError;
use crate::session::{ChatContext, ChatSession, ChatVariant};

/// User part prefix identifying the store-and-forward service.
pub const SERVICE_URI_PREFIX: &str = "rcse-standfw";

/// Entry point for invites originating from the store-and-forward server.
pub struct StoreAndForwardManager {
    ctx: ChatContext,
}

impl StoreAndForwardManager {
    pub fn new(ctx: ChatContext) -> Self {
        Self { ctx }
    }

    /// True when the invite comes from the store-and-forward service.
    pub fn is_store_and_forward_invite(invite: &Request) -> bool {
        invite
            .headers
            .get("From")
            .map(|from| from.contains(SERVICE_URI_PREFIX))
            .unwrap_or(false)
    }

    /// Accepts a push of stored messages.
    pub fn receive_stored_messages(
        &self,
        invite: Request,
    ) -> Result<Arc<ChatSession>, ChatError> {
        tracing::debug!("receive stored messages");
        let session = ChatSession::terminating(
            self.ctx.clone(),
            invite,
            ChatVariant::StoreForwardMessage,
        )?;
        let _ = session.start();
        Ok(session)
    }

    /// Accepts a push of stored delivery notifications.
    pub fn receive_stored_notifications(
        &self,
        invite: Request,
    ) -> Result<Arc<ChatSession>, ChatError> {
        tracing::debug!("receive stored notifications");
        let session = ChatSession::terminating(
            self.ctx.clone(),
            invite,
            ChatVariant::StoreForwardNotification,
        )?;
        let _ = session.start();
        Ok(session)
    }
}
