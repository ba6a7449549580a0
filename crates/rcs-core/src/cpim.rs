// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPIM message envelope (RFC 3862) as profiled for RCS messaging.
//!
//! Every in-session message travels inside a CPIM envelope carrying sender,
//! recipient, date, and (when delivery acknowledgement is requested) IMDN
//! correlation headers (`imdn.Message-ID`, `imdn.Disposition-Notification`).
//! The envelope wraps an inner typed body (plain text, isComposing, IMDN
//! report, geolocation or file-info document).
//!
//! # Wire format
//! ```text
//! From: <sip:anonymous@anonymous.invalid>
//! To: <sip:anonymous@anonymous.invalid>
//! NS: imdn <urn:ietf:params:xml:ns:imdn>
//! DateTime: 2026-01-15T10:30:00Z
//! imdn.Message-ID: Msg1234
//! imdn.Disposition-Notification: positive-delivery, display
//!
//! Content-Type: text/plain; charset=utf-8
//!
//! hello
//! ```

use bytes::Bytes;
use smol_str::SmolStr;
use std::fmt;

const MAX_PARSE_SIZE: usize = 2 * 1024 * 1024;
const MAX_BODY_SIZE: usize = 1024 * 1024;
const MAX_HEADER_VALUE_LENGTH: usize = 1024;

/// Anonymous URI used in one-to-one envelopes per the RCS-e profile.
pub const ANONYMOUS_URI: &str = "<sip:anonymous@anonymous.invalid>";

/// IMDN namespace declared via the CPIM NS header.
pub const IMDN_NAMESPACE: &str = "imdn <urn:ietf:params:xml:ns:imdn>";

/// Disposition token requesting a delivery report.
pub const POSITIVE_DELIVERY: &str = "positive-delivery";

/// Disposition token requesting a displayed report.
pub const DISPLAY: &str = "display";

/// CPIM processing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpimError {
    InputTooLarge { max: usize, actual: usize },
    BodyTooLarge { max: usize, actual: usize },
    HeaderValueTooLong { max: usize, actual: usize },
    InvalidHeaderValue(String),
    ParseError(String),
}

impl fmt::Display for CpimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpimError::InputTooLarge { max, actual } => {
                write!(f, "input too large (max {}, got {})", max, actual)
            }
            CpimError::BodyTooLarge { max, actual } => {
                write!(f, "body too large (max {}, got {})", max, actual)
            }
            CpimError::HeaderValueTooLong { max, actual } => {
                write!(f, "header value too long (max {}, got {})", max, actual)
            }
            CpimError::InvalidHeaderValue(value) => write!(f, "invalid header value: {}", value),
            CpimError::ParseError(msg) => write!(f, "cpim parse error: {}", msg),
        }
    }
}

impl std::error::Error for CpimError {}

/// A CPIM envelope around an inner typed body.
#[derive(Debug, Clone, PartialEq)]
pub struct CpimEnvelope {
    pub from: SmolStr,
    pub to: SmolStr,
    pub datetime: Option<SmolStr>,
    /// imdn.Message-ID header value
    pub message_id: Option<SmolStr>,
    /// imdn.Disposition-Notification header value
    pub disposition: Option<SmolStr>,
    /// Inner Content-Type
    pub content_type: SmolStr,
    body: Bytes,
}

impl CpimEnvelope {
    /// Creates an envelope with the given inner content type and body.
    pub fn new(content_type: &str, body: impl Into<Bytes>) -> Result<Self, CpimError> {
        let body = body.into();
        if body.len() > MAX_BODY_SIZE {
            return Err(CpimError::BodyTooLarge {
                max: MAX_BODY_SIZE,
                actual: body.len(),
            });
        }
        Ok(Self {
            from: SmolStr::new(ANONYMOUS_URI),
            to: SmolStr::new(ANONYMOUS_URI),
            datetime: None,
            message_id: None,
            disposition: None,
            content_type: SmolStr::new(content_type),
            body,
        })
    }

    pub fn with_from(mut self, from: &str) -> Result<Self, CpimError> {
        validate_header_value(from)?;
        self.from = SmolStr::new(from);
        Ok(self)
    }

    pub fn with_to(mut self, to: &str) -> Result<Self, CpimError> {
        validate_header_value(to)?;
        self.to = SmolStr::new(to);
        Ok(self)
    }

    pub fn with_datetime(mut self, datetime: &str) -> Result<Self, CpimError> {
        validate_header_value(datetime)?;
        self.datetime = Some(SmolStr::new(datetime));
        Ok(self)
    }

    /// Attaches an IMDN message id for delivery correlation.
    pub fn with_imdn_message_id(mut self, message_id: &str) -> Result<Self, CpimError> {
        validate_header_value(message_id)?;
        self.message_id = Some(SmolStr::new(message_id));
        Ok(self)
    }

    /// Requests delivery and/or displayed dispositions.
    pub fn with_disposition(mut self, tokens: &[&str]) -> Result<Self, CpimError> {
        let value = tokens.join(", ");
        validate_header_value(&value)?;
        self.disposition = Some(SmolStr::new(value));
        Ok(self)
    }

    /// Returns the inner message body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the inner body as UTF-8 text, if valid.
    pub fn body_as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    /// True when the sender asked for a delivery report.
    pub fn wants_positive_delivery(&self) -> bool {
        self.disposition
            .as_deref()
            .map(|d| d.contains(POSITIVE_DELIVERY))
            .unwrap_or(false)
    }

    /// True when the sender asked for a displayed report.
    pub fn wants_display(&self) -> bool {
        self.disposition
            .as_deref()
            .map(|d| d.contains(DISPLAY))
            .unwrap_or(false)
    }

    /// Serializes the envelope to its wire form.
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(128 + self.body.len());
        out.push_str(&format!("From: {}\r\n", self.from));
        out.push_str(&format!("To: {}\r\n", self.to));
        if self.message_id.is_some() || self.disposition.is_some() {
            out.push_str(&format!("NS: {}\r\n", IMDN_NAMESPACE));
        }
        if let Some(datetime) = &self.datetime {
            out.push_str(&format!("DateTime: {}\r\n", datetime));
        }
        if let Some(message_id) = &self.message_id {
            out.push_str(&format!("imdn.Message-ID: {}\r\n", message_id));
        }
        if let Some(disposition) = &self.disposition {
            out.push_str(&format!("imdn.Disposition-Notification: {}\r\n", disposition));
        }
        out.push_str("\r\n");
        out.push_str(&format!("Content-Type: {}\r\n", self.content_type));
        out.push_str("\r\n");
        out.push_str(&String::from_utf8_lossy(&self.body));
        out
    }
}

impl fmt::Display for CpimEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Parses a CPIM envelope from its wire form.
///
/// Tolerates an optional leading `Content-type: Message/CPIM` MIME section,
/// which some stacks prepend before the message headers.
pub fn parse_cpim(input: &str) -> Result<CpimEnvelope, CpimError> {
    if input.len() > MAX_PARSE_SIZE {
        return Err(CpimError::InputTooLarge {
            max: MAX_PARSE_SIZE,
            actual: input.len(),
        });
    }

    let sep = if input.contains("\r\n\r\n") {
        "\r\n\r\n"
    } else {
        "\n\n"
    };
    let mut sections: Vec<&str> = input.split(sep).collect();

    // Skip the optional outer MIME preamble
    if sections
        .first()
        .map(|s| s.to_ascii_lowercase().contains("message/cpim"))
        .unwrap_or(false)
    {
        sections.remove(0);
    }

    if sections.len() < 3 {
        return Err(CpimError::ParseError(
            "missing cpim sections".to_string(),
        ));
    }

    let mut envelope = CpimEnvelope::new("text/plain", Bytes::new())?;

    // Message headers
    for line in split_lines(sections[0]) {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => continue,
        };
        validate_header_value(value)?;
        if name.eq_ignore_ascii_case("From") {
            envelope.from = SmolStr::new(value);
        } else if name.eq_ignore_ascii_case("To") {
            envelope.to = SmolStr::new(value);
        } else if name.eq_ignore_ascii_case("DateTime") {
            envelope.datetime = Some(SmolStr::new(value));
        } else if name.eq_ignore_ascii_case("imdn.Message-ID") {
            envelope.message_id = Some(SmolStr::new(value));
        } else if name.eq_ignore_ascii_case("imdn.Disposition-Notification") {
            envelope.disposition = Some(SmolStr::new(value));
        }
        // NS declarations and unknown headers are not retained
    }

    // Content headers
    let mut content_type = None;
    for line in split_lines(sections[1]) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Type") {
                let value = value.trim();
                validate_header_value(value)?;
                content_type = Some(SmolStr::new(value));
            }
        }
    }
    envelope.content_type = content_type
        .ok_or_else(|| CpimError::ParseError("missing inner content-type".to_string()))?;

    // Body: remaining sections joined back (body may itself contain blank lines)
    let body = sections[2..].join(sep);
    if body.len() > MAX_BODY_SIZE {
        return Err(CpimError::BodyTooLarge {
            max: MAX_BODY_SIZE,
            actual: body.len(),
        });
    }
    envelope.body = Bytes::from(body.into_bytes());

    Ok(envelope)
}

fn split_lines(section: &str) -> impl Iterator<Item = &str> {
    section
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
}

fn validate_header_value(value: &str) -> Result<(), CpimError> {
    if value.len() > MAX_HEADER_VALUE_LENGTH {
        return Err(CpimError::HeaderValueTooLong {
            max: MAX_HEADER_VALUE_LENGTH,
            actual: value.len(),
        });
    }
    if value.chars().any(|c| c == '\r' || c == '\n') {
        return Err(CpimError::InvalidHeaderValue(
            "contains line breaks".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;

    #[test]
    fn build_plain_envelope() {
        let envelope = CpimEnvelope::new(mime::TEXT_PLAIN, Bytes::from("hello")).unwrap();
        let wire = envelope.to_wire();
        assert!(wire.starts_with("From: <sip:anonymous@anonymous.invalid>\r\n"));
        assert!(wire.contains("Content-Type: text/plain\r\n"));
        assert!(wire.ends_with("hello"));
        assert!(!wire.contains("NS:"));
    }

    #[test]
    fn build_envelope_with_imdn() {
        let envelope = CpimEnvelope::new(mime::TEXT_PLAIN, Bytes::from("hello"))
            .unwrap()
            .with_imdn_message_id("Msg42")
            .unwrap()
            .with_disposition(&[POSITIVE_DELIVERY, DISPLAY])
            .unwrap();

        let wire = envelope.to_wire();
        assert!(wire.contains("NS: imdn <urn:ietf:params:xml:ns:imdn>\r\n"));
        assert!(wire.contains("imdn.Message-ID: Msg42\r\n"));
        assert!(wire.contains("imdn.Disposition-Notification: positive-delivery, display\r\n"));
    }

    #[test]
    fn round_trip() {
        let original = CpimEnvelope::new(mime::TEXT_PLAIN, Bytes::from("bonjour"))
            .unwrap()
            .with_from("<sip:alice@example.com>")
            .unwrap()
            .with_to("<sip:bob@example.com>")
            .unwrap()
            .with_datetime("2026-01-15T10:30:00Z")
            .unwrap()
            .with_imdn_message_id("m-77")
            .unwrap()
            .with_disposition(&[POSITIVE_DELIVERY])
            .unwrap();

        let parsed = parse_cpim(&original.to_wire()).unwrap();
        assert_eq!(parsed.from, original.from);
        assert_eq!(parsed.to, original.to);
        assert_eq!(parsed.datetime, original.datetime);
        assert_eq!(parsed.message_id, original.message_id);
        assert_eq!(parsed.disposition, original.disposition);
        assert_eq!(parsed.content_type, original.content_type);
        assert_eq!(parsed.body_as_str().unwrap(), "bonjour");
        assert!(parsed.wants_positive_delivery());
        assert!(!parsed.wants_display());
    }

    #[test]
    fn parse_with_mime_preamble() {
        let input = "Content-type: Message/CPIM\r\n\r\n\
            From: <sip:a@x>\r\nTo: <sip:b@y>\r\n\r\n\
            Content-Type: text/plain\r\n\r\n\
            hi";
        let envelope = parse_cpim(input).unwrap();
        assert_eq!(envelope.from.as_str(), "<sip:a@x>");
        assert_eq!(envelope.body_as_str().unwrap(), "hi");
    }

    #[test]
    fn body_with_blank_lines_survives() {
        let envelope =
            CpimEnvelope::new(mime::TEXT_PLAIN, Bytes::from("line1\r\n\r\nline2")).unwrap();
        let parsed = parse_cpim(&envelope.to_wire()).unwrap();
        assert_eq!(parsed.body_as_str().unwrap(), "line1\r\n\r\nline2");
    }

    #[test]
    fn reject_missing_content_type() {
        let input = "From: <sip:a@x>\r\n\r\nX-Other: 1\r\n\r\nbody";
        assert!(parse_cpim(input).is_err());
    }

    #[test]
    fn reject_header_injection() {
        assert!(CpimEnvelope::new(mime::TEXT_PLAIN, Bytes::new())
            .unwrap()
            .with_from("<sip:a@x>\r\nEvil: 1")
            .is_err());
    }

    #[test]
    fn reject_oversized_input() {
        let huge = "x".repeat(MAX_PARSE_SIZE + 1);
        assert!(matches!(
            parse_cpim(&huge),
            Err(CpimError::InputTooLarge { .. })
        ));
    }
}
