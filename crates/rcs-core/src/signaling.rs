// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Signaling request/response model.
//!
//! Holds the in-memory representation of the session-protocol messages the
//! engine produces and consumes: INVITE/ACK/BYE/CANCEL/REFER requests,
//! MESSAGE for pager-mode delivery reports, and their responses. Transport
//! and transaction handling sit below this crate, behind traits.

use bytes::Bytes;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use smol_str::SmolStr;
use std::fmt;
use std::slice::Iter;

use crate::uri::SipUri;

/// Signaling request methods used by the messaging engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Refer,
    Message,
    Unknown(SmolStr),
}

impl Method {
    /// Returns the canonical uppercase string representation for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Unknown(token) => token.as_str(),
        }
    }

    /// Parses a method token, returning Unknown for extension methods.
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("INVITE") {
            Method::Invite
        } else if token.eq_ignore_ascii_case("ACK") {
            Method::Ack
        } else if token.eq_ignore_ascii_case("BYE") {
            Method::Bye
        } else if token.eq_ignore_ascii_case("CANCEL") {
            Method::Cancel
        } else if token.eq_ignore_ascii_case("REFER") {
            Method::Refer
        } else if token.eq_ignore_ascii_case("MESSAGE") {
            Method::Message
        } else {
            Method::Unknown(SmolStr::new(token))
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a single header field as a name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: SmolStr,
    pub value: SmolStr,
}

/// Collection of headers preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    /// Creates an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header to the collection.
    pub fn push(&mut self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Returns an iterator over the stored headers.
    pub fn iter(&self) -> Iter<'_, Header> {
        self.0.iter()
    }

    /// Returns the number of headers present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the collection does not contain any headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds the first header whose name matches ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&SmolStr> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
    }

    /// Returns all headers with the given name, preserving original order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SmolStr> + 'a {
        self.0
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Finds the first header value by name, ignoring ASCII case.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a SmolStr> {
    headers.get(name)
}

/// In-memory representation of a signaling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: SipUri,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    /// Builds a request from its components.
    pub fn new(method: Method, uri: SipUri, headers: Headers, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    /// Returns true if the message has a body.
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Returns the Content-Type header value, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type").map(|v| v.as_str())
    }

    /// Returns the Call-ID header value, if present.
    pub fn call_id(&self) -> Option<&str> {
        self.headers.get("Call-ID").map(|v| v.as_str())
    }
}

/// In-memory representation of a signaling response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub reason: SmolStr,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Builds a response from its components.
    pub fn new(code: u16, reason: impl Into<SmolStr>, headers: Headers, body: Bytes) -> Self {
        Self {
            code,
            reason: reason.into(),
            headers,
            body,
        }
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Returns true if this is a provisional response (1xx).
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Returns true if this is an error response (4xx, 5xx, or 6xx).
    pub fn is_error(&self) -> bool {
        (400..700).contains(&self.code)
    }
}

/// Extracts the `tag` parameter from a From/To header value.
pub fn extract_tag(value: &str) -> Option<SmolStr> {
    value.split(';').find_map(|segment| {
        let trimmed = segment.trim();
        if trimmed.len() >= 4 && trimmed[..4].eq_ignore_ascii_case("tag=") {
            Some(SmolStr::new(&trimmed[4..]))
        } else {
            None
        }
    })
}

/// Collects feature tags from Contact and Accept-Contact headers.
///
/// Feature tags are the `+`-prefixed parameters carried after the URI part,
/// returned verbatim (name and value).
pub fn collect_feature_tags(headers: &Headers) -> Vec<SmolStr> {
    let mut tags = Vec::new();
    for name in ["Contact", "Accept-Contact"] {
        for value in headers.get_all(name) {
            // Skip past the <uri> element so URI parameters are not mistaken
            // for header parameters.
            let after_uri = match value.find('>') {
                Some(pos) => &value[pos + 1..],
                None => value.as_str(),
            };
            for param in after_uri.split(';').skip_while(|p| p.is_empty()) {
                let trimmed = param.trim();
                if trimmed.starts_with('+') || trimmed.starts_with("urn") {
                    tags.push(SmolStr::new(trimmed));
                }
            }
        }
    }
    tags
}

fn random_token(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates a random dialog tag.
pub fn generate_tag() -> SmolStr {
    SmolStr::new(random_token(10))
}

/// Generates a random Call-ID.
pub fn generate_call_id() -> SmolStr {
    SmolStr::new(format!("{}@siphon-rcs", random_token(20)))
}

/// Generates a random Via branch with the RFC 3261 magic cookie.
pub fn generate_branch() -> SmolStr {
    SmolStr::new(format!("z9hG4bK{}", random_token(12)))
}

/// Generates a random message id for CPIM/IMDN correlation.
pub fn generate_message_id() -> SmolStr {
    SmolStr::new(random_token(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> SipUri {
        SipUri::parse("sip:bob@example.com").unwrap()
    }

    #[test]
    fn method_round_trip() {
        for m in [
            Method::Invite,
            Method::Ack,
            Method::Bye,
            Method::Cancel,
            Method::Refer,
            Method::Message,
        ] {
            assert_eq!(Method::from_token(m.as_str()), m);
        }
        assert_eq!(
            Method::from_token("OPTIONS"),
            Method::Unknown(SmolStr::new("OPTIONS"))
        );
    }

    #[test]
    fn headers_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.push("Call-ID", "abc");
        headers.push("contact", "<sip:a@b>");
        assert_eq!(headers.get("call-id").map(|v| v.as_str()), Some("abc"));
        assert_eq!(headers.get_all("Contact").count(), 1);
    }

    #[test]
    fn response_predicates() {
        let ok = Response::new(200, "OK", Headers::new(), Bytes::new());
        assert!(ok.is_success());
        assert!(!ok.is_error());

        let ringing = Response::new(180, "Ringing", Headers::new(), Bytes::new());
        assert!(ringing.is_provisional());

        let busy = Response::new(486, "Busy Here", Headers::new(), Bytes::new());
        assert!(busy.is_error());
    }

    #[test]
    fn extract_tag_variations() {
        assert_eq!(
            extract_tag("<sip:user@host>;tag=abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            extract_tag("<sip:user@host>;x=1;tag=t2;y=2").as_deref(),
            Some("t2")
        );
        assert_eq!(extract_tag("<sip:user@host>"), None);
    }

    #[test]
    fn collect_feature_tags_from_contact() {
        let mut headers = Headers::new();
        headers.push(
            "Contact",
            "<sip:alice@10.0.0.1;transport=tcp>;+g.3gpp.iari-ref=\"urn%3Aurn-7%3Aa\";+sip.automata",
        );
        headers.push("Accept-Contact", "*;+g.gsma.rcs.ipcall");

        let tags = collect_feature_tags(&headers);
        assert_eq!(tags.len(), 3);
        assert!(tags.iter().any(|t| t.starts_with("+g.3gpp.iari-ref")));
        assert!(tags.iter().any(|t| t.as_str() == "+sip.automata"));
        assert!(tags.iter().any(|t| t.as_str() == "+g.gsma.rcs.ipcall"));
    }

    #[test]
    fn uri_params_are_not_feature_tags() {
        let mut headers = Headers::new();
        headers.push("Contact", "<sip:alice@10.0.0.1;transport=tcp>");
        assert!(collect_feature_tags(&headers).is_empty());
    }

    #[test]
    fn generated_identifiers_are_unique() {
        assert_ne!(generate_tag(), generate_tag());
        assert_ne!(generate_call_id(), generate_call_id());
        assert!(generate_branch().starts_with("z9hG4bK"));
    }

    #[test]
    fn request_accessors() {
        let mut headers = Headers::new();
        headers.push("Call-ID", "cid-1");
        headers.push("Content-Type", "application/sdp");
        let req = Request::new(Method::Invite, uri(), headers, Bytes::from("v=0"));
        assert!(req.has_body());
        assert_eq!(req.call_id(), Some("cid-1"));
        assert_eq!(req.content_type(), Some("application/sdp"));
    }
}
