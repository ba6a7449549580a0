// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine configuration.
//!
//! Settings are plain data passed explicitly into session constructors; the
//! engine keeps no ambient mutable configuration state.

use smol_str::SmolStr;
use std::time::Duration;

use rcs_core::{Capabilities, MediaCatalog, NetworkAccess};

/// Configuration consumed by chat and file-transfer sessions.
#[derive(Debug, Clone)]
pub struct RcsSettings {
    /// Auto-accept one-to-one chat invitations
    pub chat_auto_accept: bool,
    /// Auto-accept group chat invitations
    pub group_chat_auto_accept: bool,
    /// Request IMDN delivery reports on outgoing messages
    pub imdn_activated: bool,
    /// Persist displayed-report requests so the consumer can acknowledge
    pub displayed_notification_activated: bool,
    /// Max participants in a group session, initiator included
    pub max_chat_participants: usize,
    /// Upper bound for announced file sizes; 0 disables the check
    pub max_file_transfer_size: u64,
    /// Max concurrent file-transfer sessions; 0 disables the check
    pub max_file_transfer_sessions: usize,
    /// Chat inactivity timeout; zero disables the idle timer
    pub chat_idle_timeout: Duration,
    /// How long a terminating session rings before answering busy
    pub ringing_timeout: Duration,
    /// How long to wait for the ACK confirming our 200 OK
    pub ack_timeout: Duration,
    /// REFER reuses the session dialog instead of opening a fresh one
    pub refer_uses_dialog: bool,
    /// Secure MSRP (TLS) on the media plane
    pub msrp_secured: bool,
    /// Credentials for digest challenges on signaling requests
    pub auth_user: Option<SmolStr>,
    pub auth_password: Option<SmolStr>,
    /// Locally supported optional services
    pub capabilities: Capabilities,
    /// Locally supported media, for SDP intersection
    pub media_catalog: MediaCatalog,
    /// Current network access class
    pub network_access: NetworkAccess,
}

impl Default for RcsSettings {
    fn default() -> Self {
        Self {
            chat_auto_accept: true,
            group_chat_auto_accept: true,
            imdn_activated: true,
            displayed_notification_activated: true,
            max_chat_participants: 10,
            max_file_transfer_size: 10 * 1024 * 1024,
            max_file_transfer_sessions: 3,
            chat_idle_timeout: Duration::from_secs(300),
            ringing_timeout: Duration::from_secs(60),
            ack_timeout: Duration::from_secs(30),
            refer_uses_dialog: true,
            msrp_secured: false,
            auth_user: None,
            auth_password: None,
            capabilities: Capabilities {
                im_session: true,
                file_transfer: true,
                file_transfer_http: true,
                geolocation_push: true,
                ..Capabilities::default()
            },
            media_catalog: MediaCatalog::default(),
            network_access: NetworkAccess::Wifi,
        }
    }
}

impl RcsSettings {
    /// MIME types accepted directly on the MSRP wire.
    pub fn accept_types(&self) -> String {
        format!("{} {}", rcs_core::mime::MESSAGE_CPIM, rcs_core::mime::TEXT_PLAIN)
    }

    /// MIME types accepted inside the CPIM envelope, per enabled services.
    pub fn wrapped_types(&self) -> String {
        let mut types = vec![
            rcs_core::mime::TEXT_PLAIN,
            rcs_core::mime::IS_COMPOSING,
            rcs_core::mime::IMDN,
        ];
        if self.capabilities.geolocation_push {
            types.push(rcs_core::mime::GEOLOC);
        }
        if self.capabilities.file_transfer_http {
            types.push(rcs_core::mime::FT_HTTP);
        }
        types.join(" ")
    }
}
