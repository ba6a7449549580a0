// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instant message and geolocation message models.

use smol_str::SmolStr;
use std::time::SystemTime;

use crate::geoloc::GeolocPush;
use crate::mime;

/// A chat message as delivered to or received from a session.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantMessage {
    pub message_id: SmolStr,
    /// Remote party URI or address
    pub remote: SmolStr,
    pub text: String,
    pub mime_type: SmolStr,
    pub date: SystemTime,
    /// Display name of the sender, when known
    pub display_name: Option<SmolStr>,
    /// The sender asked for a displayed report
    pub displayed_report_requested: bool,
}

impl InstantMessage {
    pub fn new(message_id: &str, remote: &str, text: impl Into<String>) -> Self {
        Self {
            message_id: SmolStr::new(message_id),
            remote: SmolStr::new(remote),
            text: text.into(),
            mime_type: SmolStr::new(mime::TEXT_PLAIN),
            date: SystemTime::now(),
            display_name: None,
            displayed_report_requested: false,
        }
    }

    pub fn with_displayed_report_requested(mut self, requested: bool) -> Self {
        self.displayed_report_requested = requested;
        self
    }

    pub fn with_display_name(mut self, name: Option<&str>) -> Self {
        self.display_name = name.map(SmolStr::new);
        self
    }
}

/// A received geolocation push bound to its message metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocMessage {
    pub message_id: SmolStr,
    pub remote: SmolStr,
    pub geoloc: GeolocPush,
    pub date: SystemTime,
    pub display_name: Option<SmolStr>,
    pub displayed_report_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let msg = InstantMessage::new("m1", "sip:alice@example.com", "hello");
        assert_eq!(msg.mime_type.as_str(), mime::TEXT_PLAIN);
        assert!(!msg.displayed_report_requested);
        assert_eq!(msg.display_name, None);

        let msg = msg
            .with_displayed_report_requested(true)
            .with_display_name(Some("Alice"));
        assert!(msg.displayed_report_requested);
        assert_eq!(msg.display_name.as_deref(), Some("Alice"));
    }
}
