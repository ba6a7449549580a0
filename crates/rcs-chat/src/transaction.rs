// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Signaling transaction seam and request construction.
//!
//! The transaction/transport layer below the engine is a collaborator
//! reached through [`SignalingTransport`]. Request builders here produce the
//! messages the session flows need: INVITE (plain or multipart), responses,
//! REFER for participant addition, and pager-mode MESSAGE for the
//! signaling-plane delivery-report fallback.

use async_trait::async_trait;
use bytes::Bytes;
use rcs_core::{
    generate_branch, Headers, Method, Request, Response, SipUri,
};
use smol_str::SmolStr;
use std::time::Duration;

use rcs_dialog::DialogPath;

use crate::error::SignalingError;

/// Transactional send/receive primitive for the signaling plane.
///
/// Implementations own retransmission, provisional-response handling, and
/// credential attachment for challenges on initial requests; for a 2xx
/// INVITE response they also emit the ACK, so a successful
/// [`send_request`](Self::send_request) on an INVITE leaves the dialog
/// confirmed from the transaction layer's perspective. In-dialog challenges
/// (e.g. 407 on REFER) are surfaced to the caller instead.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Sends a request and waits for its final response.
    async fn send_request(&self, request: Request) -> Result<Response, SignalingError>;

    /// Sends a response to a previously received request.
    async fn send_response(&self, response: Response) -> Result<(), SignalingError>;

    /// Waits for the ACK confirming our 2xx final response on the dialog.
    async fn wait_ack(&self, call_id: &str, timeout: Duration) -> Result<(), SignalingError>;
}

const USER_AGENT: &str = "siphon-rcs/0.1.0";

/// Header carrying the stable conversation identifier.
pub const CONTRIBUTION_ID_HEADER: &str = "Contribution-ID";

fn base_headers(dialog: &DialogPath, method: &Method) -> Headers {
    let mut headers = Headers::new();
    headers.push(
        "Via",
        format!("SIP/2.0/UDP placeholder;branch={}", generate_branch()),
    );
    headers.push(
        "From",
        format!("<{}>;tag={}", dialog.local_party, dialog.local_tag),
    );
    match &dialog.remote_tag {
        Some(tag) => headers.push("To", format!("<{}>;tag={}", dialog.remote_party, tag)),
        None => headers.push("To", format!("<{}>", dialog.remote_party)),
    }
    headers.push("Call-ID", dialog.call_id.clone());
    headers.push("CSeq", format!("{} {}", dialog.cseq(), method.as_str()));
    for route in &dialog.route_set {
        headers.push("Route", format!("<{}>", route));
    }
    headers.push("Max-Forwards", "70");
    headers.push("User-Agent", USER_AGENT);
    headers
}

/// Builds an INVITE for the dialog, advertising the given feature tags and
/// carrying the negotiated local content.
pub fn create_invite(
    dialog: &DialogPath,
    feature_tags: &[SmolStr],
    contribution_id: &str,
    subject: Option<&str>,
    content_type: &str,
    content: &str,
) -> Request {
    let mut headers = base_headers(dialog, &Method::Invite);
    headers.push("Contact", contact_with_tags(&dialog.local_party, feature_tags));
    if !feature_tags.is_empty() {
        headers.push("Accept-Contact", accept_contact_with_tags(feature_tags));
    }
    headers.push(CONTRIBUTION_ID_HEADER, contribution_id);
    if let Some(subject) = subject {
        headers.push("Subject", subject);
    }
    headers.push("Content-Type", content_type);
    headers.push("Content-Length", content.len().to_string());

    Request::new(
        Method::Invite,
        dialog.target.clone(),
        headers,
        Bytes::from(content.to_owned()),
    )
}

/// Builds a response to the given request, answering with the dialog's local
/// tag on the To header.
pub fn create_response(
    invite: &Request,
    dialog: &DialogPath,
    code: u16,
    reason: &str,
    feature_tags: &[SmolStr],
    content_type: Option<&str>,
    body: &str,
) -> Response {
    let mut headers = Headers::new();
    for name in ["Via", "From", "Call-ID", "CSeq"] {
        for value in invite.headers.get_all(name) {
            headers.push(name, value.clone());
        }
    }
    match invite.headers.get("To") {
        Some(to) if to.contains("tag=") => headers.push("To", to.clone()),
        Some(to) => headers.push("To", format!("{};tag={}", to, dialog.local_tag)),
        None => headers.push(
            "To",
            format!("<{}>;tag={}", dialog.local_party, dialog.local_tag),
        ),
    }
    if (200..300).contains(&code) {
        headers.push("Contact", contact_with_tags(&dialog.local_party, feature_tags));
    }
    headers.push("User-Agent", USER_AGENT);
    if let Some(content_type) = content_type {
        headers.push("Content-Type", content_type);
    }
    headers.push("Content-Length", body.len().to_string());

    Response::new(code, reason, headers, Bytes::from(body.to_owned()))
}

/// Builds a REFER adding one or more participants.
///
/// A single target travels in the Refer-To header; several targets travel as
/// a resource list referenced by the header, per the conference factory
/// convention.
pub fn create_refer(dialog: &DialogPath, targets: &[SipUri]) -> Request {
    let mut headers = base_headers(dialog, &Method::Refer);
    headers.push("Contact", format!("<{}>", dialog.local_party));
    headers.push("Referred-By", format!("<{}>", dialog.local_party));

    let body;
    if targets.len() == 1 {
        headers.push("Refer-To", format!("<{}>", targets[0]));
        headers.push("Content-Length", "0");
        body = String::new();
    } else {
        headers.push(
            "Refer-To",
            format!("<{};method=INVITE>", dialog.target),
        );
        headers.push("Require", "multiple-refer");
        headers.push("Content-Type", "application/resource-lists+xml");
        body = build_resource_list(targets);
        headers.push("Content-Length", body.len().to_string());
    }

    Request::new(
        Method::Refer,
        dialog.target.clone(),
        headers,
        Bytes::from(body),
    )
}

/// Builds a pager-mode MESSAGE carrying a CPIM payload, used when a delivery
/// report cannot travel over the media plane.
pub fn create_pager_message(dialog: &DialogPath, cpim: &str) -> Request {
    let mut headers = base_headers(dialog, &Method::Message);
    headers.push("Content-Type", rcs_core::mime::MESSAGE_CPIM);
    headers.push("Content-Length", cpim.len().to_string());

    Request::new(
        Method::Message,
        dialog.target.clone(),
        headers,
        Bytes::from(cpim.to_owned()),
    )
}

fn contact_with_tags(local_party: &SipUri, feature_tags: &[SmolStr]) -> String {
    let mut contact = format!("<{}>", local_party);
    for tag in feature_tags {
        contact.push(';');
        contact.push_str(tag);
    }
    contact
}

fn accept_contact_with_tags(feature_tags: &[SmolStr]) -> String {
    let mut value = String::from("*");
    for tag in feature_tags {
        value.push(';');
        value.push_str(tag);
    }
    value
}

fn build_resource_list(targets: &[SipUri]) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n");
    out.push_str("<resource-lists xmlns=\"urn:ietf:params:xml:ns:resource-lists\">\r\n");
    out.push_str("<list>\r\n");
    for target in targets {
        out.push_str(&format!("<entry uri=\"{}\"/>\r\n", target));
    }
    out.push_str("</list>\r\n");
    out.push_str("</resource-lists>");
    out
}

/// Parses participant URIs out of a resource list body.
pub fn parse_resource_list(body: &str) -> Vec<SipUri> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<entry") {
        let section = &rest[start..];
        let end = section.find("/>").or_else(|| section.find('>'));
        let Some(end) = end else { break };
        let tag = &section[..end];
        if let Some(pos) = tag.find("uri=\"") {
            let value = &tag[pos + 5..];
            if let Some(close) = value.find('"') {
                if let Some(uri) = SipUri::parse(&value[..close]) {
                    out.push(uri);
                }
            }
        }
        rest = &section[end..];
    }
    out
}

/// Digest authentication for signaling requests.
///
/// Reads a Proxy-Authenticate challenge and produces the matching
/// Proxy-Authorization header value on the retried request.
pub struct SessionAuthenticationAgent {
    user: SmolStr,
    password: SmolStr,
    realm: Option<SmolStr>,
    nonce: Option<SmolStr>,
}

impl SessionAuthenticationAgent {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: SmolStr::new(user),
            password: SmolStr::new(password),
            realm: None,
            nonce: None,
        }
    }

    /// Reads realm and nonce from a Proxy-Authenticate header value.
    pub fn read_proxy_authenticate(&mut self, response: &Response) {
        if let Some(challenge) = response.headers.get("Proxy-Authenticate") {
            self.realm = digest_param(challenge, "realm").map(SmolStr::new);
            self.nonce = digest_param(challenge, "nonce").map(SmolStr::new);
        }
    }

    /// True once a challenge has been read.
    pub fn has_challenge(&self) -> bool {
        self.realm.is_some() && self.nonce.is_some()
    }

    /// Attaches the Proxy-Authorization header to a retried request.
    pub fn set_proxy_authorization(&self, request: &mut Request) {
        let (Some(realm), Some(nonce)) = (&self.realm, &self.nonce) else {
            return;
        };
        let uri = request.uri.to_string();
        let ha1 = md5_hex(&format!("{}:{}:{}", self.user, realm, self.password));
        let ha2 = md5_hex(&format!("{}:{}", request.method.as_str(), uri));
        let response = md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2));
        request.headers.push(
            "Proxy-Authorization",
            format!(
                "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
                self.user, realm, nonce, uri, response
            ),
        );
    }
}

fn digest_param<'a>(challenge: &'a str, name: &str) -> Option<&'a str> {
    let lower = challenge.to_ascii_lowercase();
    let needle = format!("{}=", name);
    let pos = lower.find(&needle)?;
    let value = &challenge[pos + needle.len()..];
    let value = value.trim_start();
    if let Some(stripped) = value.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(&stripped[..end])
    } else {
        Some(value.split([',', ' ']).next()?.trim())
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
