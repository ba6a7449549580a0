// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! isComposing state documents (RFC 3994).

use std::fmt;
use std::time::Duration;

use crate::xml;

const MAX_PARSE_SIZE: usize = 8 * 1024;

/// Default refresh interval advertised in outgoing documents.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsComposingError {
    InputTooLarge { max: usize, actual: usize },
    MissingState,
}

impl fmt::Display for IsComposingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsComposingError::InputTooLarge { max, actual } => {
                write!(f, "input too large (max {}, got {})", max, actual)
            }
            IsComposingError::MissingState => write!(f, "missing state element"),
        }
    }
}

impl std::error::Error for IsComposingError {}

/// Parsed composing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsComposingInfo {
    /// True for "active", false for "idle"
    pub active: bool,
    /// Sender-advertised refresh interval
    pub refresh: Option<Duration>,
}

/// Builds an isComposing document for the given state.
pub fn build_is_composing(active: bool, refresh: Duration) -> String {
    let state = if active { "active" } else { "idle" };
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n");
    out.push_str("<isComposing xmlns=\"urn:ietf:params:xml:ns:im-iscomposing\">\r\n");
    out.push_str(&format!("<state>{}</state>\r\n", state));
    out.push_str("<contenttype>text/plain</contenttype>\r\n");
    if active {
        out.push_str(&format!("<refresh>{}</refresh>\r\n", refresh.as_secs()));
    }
    out.push_str("</isComposing>");
    out
}

/// Parses an isComposing document.
pub fn parse_is_composing(input: &[u8]) -> Result<IsComposingInfo, IsComposingError> {
    if input.len() > MAX_PARSE_SIZE {
        return Err(IsComposingError::InputTooLarge {
            max: MAX_PARSE_SIZE,
            actual: input.len(),
        });
    }
    let text = String::from_utf8_lossy(input);
    let state = xml::element_text(&text, "state").ok_or(IsComposingError::MissingState)?;
    let refresh = xml::element_text(&text, "refresh")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    Ok(IsComposingInfo {
        active: state.eq_ignore_ascii_case("active"),
        refresh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_active() {
        let doc = build_is_composing(true, Duration::from_secs(90));
        let info = parse_is_composing(doc.as_bytes()).unwrap();
        assert!(info.active);
        assert_eq!(info.refresh, Some(Duration::from_secs(90)));
    }

    #[test]
    fn round_trip_idle() {
        let doc = build_is_composing(false, DEFAULT_REFRESH);
        let info = parse_is_composing(doc.as_bytes()).unwrap();
        assert!(!info.active);
        assert_eq!(info.refresh, None);
    }

    #[test]
    fn reject_missing_state() {
        assert_eq!(
            parse_is_composing(b"<isComposing/>"),
            Err(IsComposingError::MissingState)
        );
    }
}
