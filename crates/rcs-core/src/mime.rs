// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! MIME types carried on the MSRP wire and inside CPIM envelopes.

/// Plain text chat message.
pub const TEXT_PLAIN: &str = "text/plain";

/// CPIM envelope (RFC 3862).
pub const MESSAGE_CPIM: &str = "message/cpim";

/// isComposing state document (RFC 3994).
pub const IS_COMPOSING: &str = "application/im-iscomposing+xml";

/// IMDN delivery report document (RFC 5438).
pub const IMDN: &str = "message/imdn+xml";

/// Geolocation push document.
pub const GEOLOC: &str = "application/vnd.gsma.rcspushlocation+xml";

/// File-transfer-over-HTTP info document.
pub const FT_HTTP: &str = "application/vnd.gsma.rcs-ft-http+xml";

/// SDP session description.
pub const APPLICATION_SDP: &str = "application/sdp";

/// Multipart invite body mixing SDP and CPIM parts.
pub const MULTIPART_MIXED: &str = "multipart/mixed";

/// Compares a possibly-parameterized MIME value against a bare type.
fn matches(mime: &str, expected: &str) -> bool {
    mime.split(';')
        .next()
        .map(|t| t.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

pub fn is_text_plain(mime: &str) -> bool {
    matches(mime, TEXT_PLAIN)
}

pub fn is_message_cpim(mime: &str) -> bool {
    matches(mime, MESSAGE_CPIM)
}

pub fn is_composing(mime: &str) -> bool {
    matches(mime, IS_COMPOSING)
}

pub fn is_imdn(mime: &str) -> bool {
    matches(mime, IMDN)
}

pub fn is_geoloc(mime: &str) -> bool {
    matches(mime, GEOLOC)
}

pub fn is_ft_http(mime: &str) -> bool {
    matches(mime, FT_HTTP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_ignores_parameters_and_case() {
        assert!(is_text_plain("text/plain; charset=utf-8"));
        assert!(is_message_cpim("Message/CPIM"));
        assert!(is_ft_http(FT_HTTP));
        assert!(!is_text_plain(MESSAGE_CPIM));
    }
}
