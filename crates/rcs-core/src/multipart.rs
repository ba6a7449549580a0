// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multipart invite bodies.
//!
//! An invite that carries a first chat message or a file-transfer
//! announcement uses a `multipart/mixed` body with an SDP part and a CPIM
//! part:
//! ```text
//! --boundary1
//! Content-Type: application/sdp
//! Content-Length: 123
//!
//! v=0
//! ...
//! --boundary1
//! Content-Type: message/cpim
//! Content-Length: 456
//!
//! From: ...
//! --boundary1--
//! ```

use smol_str::SmolStr;
use std::fmt;

const MAX_PARSE_SIZE: usize = 2 * 1024 * 1024;
const MAX_PARTS: usize = 8;

/// Boundary tag used in outgoing multipart bodies.
pub const BOUNDARY_TAG: &str = "boundary1";

const BOUNDARY_DELIMITER: &str = "--";
const CRLF: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartError {
    InputTooLarge { max: usize, actual: usize },
    TooManyParts { max: usize },
    MissingBoundary,
    ParseError(String),
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultipartError::InputTooLarge { max, actual } => {
                write!(f, "input too large (max {}, got {})", max, actual)
            }
            MultipartError::TooManyParts { max } => write!(f, "too many parts (max {})", max),
            MultipartError::MissingBoundary => write!(f, "missing boundary"),
            MultipartError::ParseError(msg) => write!(f, "multipart parse error: {}", msg),
        }
    }
}

impl std::error::Error for MultipartError {}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub content_type: SmolStr,
    pub body: String,
}

/// Builds a multipart/mixed body from typed parts using [`BOUNDARY_TAG`].
pub fn build_multipart(parts: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(256);
    for (content_type, body) in parts {
        out.push_str(BOUNDARY_DELIMITER);
        out.push_str(BOUNDARY_TAG);
        out.push_str(CRLF);
        out.push_str(&format!("Content-Type: {}", content_type));
        out.push_str(CRLF);
        out.push_str(&format!("Content-Length: {}", body.len()));
        out.push_str(CRLF);
        out.push_str(CRLF);
        out.push_str(body);
        out.push_str(CRLF);
    }
    out.push_str(BOUNDARY_DELIMITER);
    out.push_str(BOUNDARY_TAG);
    out.push_str(BOUNDARY_DELIMITER);
    out
}

/// Parses a multipart body delimited by the given boundary.
pub fn parse_multipart(input: &str, boundary: &str) -> Result<Vec<MultipartPart>, MultipartError> {
    if input.len() > MAX_PARSE_SIZE {
        return Err(MultipartError::InputTooLarge {
            max: MAX_PARSE_SIZE,
            actual: input.len(),
        });
    }
    if boundary.is_empty() {
        return Err(MultipartError::MissingBoundary);
    }

    let delimiter = format!("{}{}", BOUNDARY_DELIMITER, boundary);
    let mut parts = Vec::new();

    for raw_part in input.split(delimiter.as_str()).skip(1) {
        // Closing delimiter leaves "--" (possibly with trailing CRLF)
        if raw_part.trim_start().starts_with(BOUNDARY_DELIMITER) {
            break;
        }
        if parts.len() >= MAX_PARTS {
            return Err(MultipartError::TooManyParts { max: MAX_PARTS });
        }

        let part = raw_part.trim_start_matches(CRLF);
        let (headers, body) = match part.split_once("\r\n\r\n") {
            Some(split) => split,
            None => part
                .split_once("\n\n")
                .ok_or_else(|| MultipartError::ParseError("missing part body".to_string()))?,
        };

        let mut content_type = SmolStr::new("text/plain");
        for line in headers.lines() {
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("Content-Type") {
                    content_type = SmolStr::new(value.trim());
                }
            }
        }

        parts.push(MultipartPart {
            content_type,
            body: body.trim_end_matches(CRLF).trim_end_matches('\n').to_owned(),
        });
    }

    if parts.is_empty() {
        return Err(MultipartError::ParseError("no parts found".to_string()));
    }
    Ok(parts)
}

/// Extracts the boundary parameter from a Content-Type header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;

    #[test]
    fn build_and_parse_sdp_plus_cpim() {
        let sdp = "v=0\r\nm=message 9 TCP/MSRP *";
        let cpim = "From: <sip:a@x>\r\n\r\nContent-Type: text/plain\r\n\r\nhello";
        let body = build_multipart(&[
            (mime::APPLICATION_SDP, sdp),
            (mime::MESSAGE_CPIM, cpim),
        ]);

        let parts = parse_multipart(&body, BOUNDARY_TAG).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].content_type.as_str(), mime::APPLICATION_SDP);
        assert_eq!(parts[0].body, sdp);
        assert_eq!(parts[1].content_type.as_str(), mime::MESSAGE_CPIM);
        assert_eq!(parts[1].body, cpim);
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=boundary1"),
            Some("boundary1")
        );
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=\"quoted\""),
            Some("quoted")
        );
        assert_eq!(boundary_from_content_type("application/sdp"), None);
    }

    #[test]
    fn reject_empty_body() {
        assert!(parse_multipart("", BOUNDARY_TAG).is_err());
        assert!(parse_multipart("some body", "").is_err());
    }

    #[test]
    fn closing_delimiter_ends_parsing() {
        let body = build_multipart(&[(mime::TEXT_PLAIN, "only part")]);
        let parts = parse_multipart(&body, BOUNDARY_TAG).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body, "only part");
    }
}
