// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SDP handling for MSRP-based chat media.
//!
//! Covers the subset of SDP the chat engine negotiates: `m=message` media
//! descriptions carrying `a=path`, `a=setup`, `a=accept-types` and
//! `a=accept-wrapped-types` attributes (RFC 4975 / RFC 4145), plus `m=video`
//! descriptions used by capability exchange.
//!
//! # Example
//! ```
//! use rcs_sdp::{parse_sdp, ChatSdpParams, SetupMode, build_chat_sdp};
//!
//! let sdp = build_chat_sdp(&ChatSdpParams {
//!     ip_address: "10.0.0.1",
//!     port: 20000,
//!     protocol: "TCP/MSRP",
//!     accept_types: "message/cpim",
//!     wrapped_types: "text/plain",
//!     setup: SetupMode::Passive,
//!     path: "msrp://10.0.0.1:20000/s1;tcp",
//!     direction: "sendrecv",
//! });
//! let session = parse_sdp(&sdp).unwrap();
//! assert_eq!(session.media[0].media.as_str(), "message");
//! ```

use smol_str::SmolStr;
use std::fmt;

pub mod builder;
pub mod negotiate;
pub use builder::{build_capability_sdp, build_chat_sdp, ChatSdpParams, VideoCodecDesc};
pub use negotiate::{create_setup_answer, create_setup_offer, SetupMode, ACTIVE_SETUP_PORT};

const MAX_SDP_SIZE: usize = 64 * 1024;
const MAX_MEDIA_SECTIONS: usize = 16;
const MAX_ATTRIBUTES: usize = 64;

/// SDP processing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    InputTooLarge { max: usize, actual: usize },
    TooManyMediaSections { max: usize },
    TooManyAttributes { max: usize },
    InvalidMediaLine(String),
    MissingAttribute(&'static str),
    ParseError(String),
}

impl fmt::Display for SdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpError::InputTooLarge { max, actual } => {
                write!(f, "sdp too large (max {}, got {})", max, actual)
            }
            SdpError::TooManyMediaSections { max } => {
                write!(f, "too many media sections (max {})", max)
            }
            SdpError::TooManyAttributes { max } => {
                write!(f, "too many attributes (max {})", max)
            }
            SdpError::InvalidMediaLine(line) => write!(f, "invalid media line: {}", line),
            SdpError::MissingAttribute(name) => write!(f, "missing attribute: {}", name),
            SdpError::ParseError(msg) => write!(f, "sdp parse error: {}", msg),
        }
    }
}

impl std::error::Error for SdpError {}

/// A single `m=` section with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    /// Media kind ("message", "video", ...)
    pub media: SmolStr,
    /// Transport port from the media line
    pub port: u16,
    /// Transport protocol ("TCP/MSRP", "TCP/TLS/MSRP", "RTP/AVP", ...)
    pub protocol: SmolStr,
    /// Format list from the media line
    pub formats: Vec<SmolStr>,
    /// Media connection address, overriding the session-level one
    pub connection: Option<SmolStr>,
    /// `a=` attributes in original order; flag attributes carry no value
    pub attributes: Vec<(SmolStr, Option<SmolStr>)>,
}

impl MediaDescription {
    /// Returns the first value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    /// Returns all values of the named attribute, preserving order.
    pub fn attributes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| v.as_deref())
    }

    /// Returns true if the flag attribute is present (with or without value).
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// Parsed SDP session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpSession {
    /// Session-level connection address (`c=IN IP4 host`)
    pub connection: Option<SmolStr>,
    /// Media descriptions in order of appearance
    pub media: Vec<MediaDescription>,
}

impl SdpSession {
    /// Returns the first media description of the given kind.
    pub fn media_of_kind(&self, kind: &str) -> Option<&MediaDescription> {
        self.media
            .iter()
            .find(|m| m.media.eq_ignore_ascii_case(kind))
    }

    /// Returns every media description of the given kind.
    pub fn all_media_of_kind<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a MediaDescription> + 'a {
        self.media
            .iter()
            .filter(move |m| m.media.eq_ignore_ascii_case(kind))
    }

    /// Resolves the remote host for a media description, preferring the
    /// media-level connection over the session-level one.
    pub fn remote_host<'a>(&'a self, media: &'a MediaDescription) -> Option<&'a str> {
        media
            .connection
            .as_deref()
            .or(self.connection.as_deref())
    }
}

/// Parses an SDP session description.
///
/// Unknown lines are skipped; the parser only retains what the chat engine
/// consumes (connection addresses, media lines, attributes).
pub fn parse_sdp(input: &str) -> Result<SdpSession, SdpError> {
    if input.len() > MAX_SDP_SIZE {
        return Err(SdpError::InputTooLarge {
            max: MAX_SDP_SIZE,
            actual: input.len(),
        });
    }

    let mut session = SdpSession {
        connection: None,
        media: Vec::new(),
    };

    for raw_line in input.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.len() < 2 || line.as_bytes()[1] != b'=' {
            continue;
        }
        let value = &line[2..];

        match line.as_bytes()[0] {
            b'c' => {
                let host = parse_connection(value)?;
                match session.media.last_mut() {
                    Some(media) => media.connection = Some(host),
                    None => session.connection = Some(host),
                }
            }
            b'm' => {
                if session.media.len() >= MAX_MEDIA_SECTIONS {
                    return Err(SdpError::TooManyMediaSections {
                        max: MAX_MEDIA_SECTIONS,
                    });
                }
                session.media.push(parse_media_line(value)?);
            }
            b'a' => {
                if let Some(media) = session.media.last_mut() {
                    if media.attributes.len() >= MAX_ATTRIBUTES {
                        return Err(SdpError::TooManyAttributes {
                            max: MAX_ATTRIBUTES,
                        });
                    }
                    let (name, attr_value) = match value.split_once(':') {
                        Some((n, v)) => (SmolStr::new(n.trim()), Some(SmolStr::new(v.trim()))),
                        None => (SmolStr::new(value.trim()), None),
                    };
                    media.attributes.push((name, attr_value));
                }
            }
            _ => {}
        }
    }

    Ok(session)
}

fn parse_connection(value: &str) -> Result<SmolStr, SdpError> {
    // c=IN IP4 host
    let host = value
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| SdpError::ParseError(format!("invalid connection line: {}", value)))?;
    Ok(SmolStr::new(host))
}

fn parse_media_line(value: &str) -> Result<MediaDescription, SdpError> {
    // m=<media> <port> <proto> <fmt list>
    let mut parts = value.split_whitespace();
    let media = parts
        .next()
        .ok_or_else(|| SdpError::InvalidMediaLine(value.to_owned()))?;
    let port = parts
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| SdpError::InvalidMediaLine(value.to_owned()))?;
    let protocol = parts
        .next()
        .ok_or_else(|| SdpError::InvalidMediaLine(value.to_owned()))?;
    let formats = parts.map(SmolStr::new).collect();

    Ok(MediaDescription {
        media: SmolStr::new(media),
        port,
        protocol: SmolStr::new(protocol),
        formats,
        connection: None,
        attributes: Vec::new(),
    })
}

/// Extracts the codec name from an `a=rtpmap` value (`"96 H264/90000"` → `"h264"`).
pub fn rtpmap_codec(rtpmap: &str) -> Option<SmolStr> {
    let encoding = rtpmap.split_whitespace().nth(1)?;
    let codec = encoding.split('/').next()?.trim();
    if codec.is_empty() {
        return None;
    }
    Some(SmolStr::new(codec.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT_SDP: &str = "v=0\r\n\
        o=- 123 123 IN IP4 10.0.0.2\r\n\
        s=-\r\n\
        c=IN IP4 10.0.0.2\r\n\
        t=0 0\r\n\
        m=message 20000 TCP/MSRP *\r\n\
        a=accept-types:message/cpim text/plain\r\n\
        a=accept-wrapped-types:text/plain\r\n\
        a=setup:active\r\n\
        a=path:msrp://10.0.0.2:20000/s1;tcp\r\n\
        a=sendrecv\r\n";

    #[test]
    fn parse_chat_sdp() {
        let session = parse_sdp(CHAT_SDP).unwrap();
        assert_eq!(session.connection.as_deref(), Some("10.0.0.2"));

        let media = session.media_of_kind("message").unwrap();
        assert_eq!(media.port, 20000);
        assert_eq!(media.protocol.as_str(), "TCP/MSRP");
        assert_eq!(media.attribute("setup"), Some("active"));
        assert_eq!(
            media.attribute("path"),
            Some("msrp://10.0.0.2:20000/s1;tcp")
        );
        assert_eq!(
            media.attribute("accept-types"),
            Some("message/cpim text/plain")
        );
        assert!(media.has_attribute("sendrecv"));
    }

    #[test]
    fn media_connection_overrides_session() {
        let sdp = "v=0\r\nc=IN IP4 1.2.3.4\r\nm=message 9 TCP/MSRP *\r\nc=IN IP4 5.6.7.8\r\n";
        let session = parse_sdp(sdp).unwrap();
        let media = session.media_of_kind("message").unwrap();
        assert_eq!(session.remote_host(media), Some("5.6.7.8"));
    }

    #[test]
    fn session_connection_used_when_media_has_none() {
        let session = parse_sdp(CHAT_SDP).unwrap();
        let media = session.media_of_kind("message").unwrap();
        assert_eq!(session.remote_host(media), Some("10.0.0.2"));
    }

    #[test]
    fn unknown_lines_are_skipped() {
        let sdp = "v=0\r\nz=ignored\r\nb=AS:128\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n";
        let session = parse_sdp(sdp).unwrap();
        assert_eq!(session.media.len(), 1);
        assert_eq!(
            session.media[0].attribute("rtpmap"),
            Some("96 H264/90000")
        );
    }

    #[test]
    fn rejects_invalid_media_line() {
        assert!(parse_sdp("m=message notaport TCP/MSRP *\r\n").is_err());
    }

    #[test]
    fn rejects_oversized_input() {
        let huge = "a".repeat(MAX_SDP_SIZE + 1);
        assert!(matches!(
            parse_sdp(&huge),
            Err(SdpError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn rtpmap_codec_extraction() {
        assert_eq!(rtpmap_codec("96 H264/90000").as_deref(), Some("h264"));
        assert_eq!(rtpmap_codec("97 H263-2000").as_deref(), Some("h263-2000"));
        assert_eq!(rtpmap_codec("bad"), None);
    }

    #[test]
    fn multiple_rtpmap_values() {
        let sdp =
            "m=video 0 RTP/AVP 96 97\r\na=rtpmap:96 H264/90000\r\na=rtpmap:97 H263/90000\r\n";
        let session = parse_sdp(sdp).unwrap();
        let codecs: Vec<_> = session.media[0]
            .attributes_named("rtpmap")
            .filter_map(rtpmap_codec)
            .collect();
        assert_eq!(codecs, vec![SmolStr::new("h264"), SmolStr::new("h263")]);
    }
}
