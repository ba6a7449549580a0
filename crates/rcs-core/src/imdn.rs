// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! IMDN delivery/display notification documents (RFC 5438).
//!
//! # Document format
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <imdn xmlns="urn:ietf:params:xml:ns:imdn">
//! <message-id>34jk324j</message-id>
//! <datetime>2026-01-15T10:30:00Z</datetime>
//! <delivery-notification><status><delivered/></status></delivery-notification>
//! </imdn>
//! ```
//! A `display-notification` wrapper carries `<displayed/>`; `<failed/>` may
//! appear under either wrapper.

use smol_str::SmolStr;
use std::fmt;

use crate::xml;

const MAX_PARSE_SIZE: usize = 16 * 1024;

/// Delivery state of a message, ordered by forward progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Accepted for sending, no acknowledgement yet
    Sent,
    /// Remote endpoint acknowledged reception
    Delivered,
    /// Remote user displayed the message
    Displayed,
    /// Delivery failed; terminal
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Displayed => "displayed",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("sent") {
            Some(DeliveryStatus::Sent)
        } else if value.eq_ignore_ascii_case("delivered") {
            Some(DeliveryStatus::Delivered)
        } else if value.eq_ignore_ascii_case("displayed") {
            Some(DeliveryStatus::Displayed)
        } else if value.eq_ignore_ascii_case("failed") {
            Some(DeliveryStatus::Failed)
        } else {
            None
        }
    }

    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Sent => 0,
            DeliveryStatus::Delivered => 1,
            DeliveryStatus::Displayed => 2,
            DeliveryStatus::Failed => 3,
        }
    }

    /// Applies a status update, enforcing strictly-forward progression.
    ///
    /// `failed` is accepted from any non-failed state and is terminal; any
    /// other transition must move strictly forward in the
    /// sent < delivered < displayed sequence.
    pub fn advance(self, next: DeliveryStatus) -> Result<DeliveryStatus, ImdnError> {
        if self == DeliveryStatus::Failed {
            return Err(ImdnError::BackwardTransition {
                current: self,
                proposed: next,
            });
        }
        if next == DeliveryStatus::Failed {
            return Ok(next);
        }
        if next.rank() <= self.rank() {
            return Err(ImdnError::BackwardTransition {
                current: self,
                proposed: next,
            });
        }
        Ok(next)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// IMDN processing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImdnError {
    InputTooLarge { max: usize, actual: usize },
    MissingMessageId,
    MissingStatus,
    BackwardTransition {
        current: DeliveryStatus,
        proposed: DeliveryStatus,
    },
    ParseError(String),
}

impl fmt::Display for ImdnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImdnError::InputTooLarge { max, actual } => {
                write!(f, "input too large (max {}, got {})", max, actual)
            }
            ImdnError::MissingMessageId => write!(f, "missing message-id element"),
            ImdnError::MissingStatus => write!(f, "missing status element"),
            ImdnError::BackwardTransition { current, proposed } => write!(
                f,
                "status cannot move from {} to {}",
                current, proposed
            ),
            ImdnError::ParseError(msg) => write!(f, "imdn parse error: {}", msg),
        }
    }
}

impl std::error::Error for ImdnError {}

/// A parsed or constructed IMDN document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImdnDocument {
    pub message_id: SmolStr,
    pub datetime: Option<SmolStr>,
    pub status: DeliveryStatus,
}

impl ImdnDocument {
    pub fn new(message_id: &str, status: DeliveryStatus) -> Self {
        Self {
            message_id: SmolStr::new(message_id),
            datetime: None,
            status,
        }
    }

    pub fn with_datetime(mut self, datetime: &str) -> Self {
        self.datetime = Some(SmolStr::new(datetime));
        self
    }

    /// Serializes the document to XML.
    pub fn to_xml(&self) -> String {
        let wrapper = match self.status {
            DeliveryStatus::Displayed => "display-notification",
            _ => "delivery-notification",
        };
        let mut out = String::with_capacity(256);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n");
        out.push_str("<imdn xmlns=\"urn:ietf:params:xml:ns:imdn\">\r\n");
        out.push_str(&format!(
            "<message-id>{}</message-id>\r\n",
            xml::escape(&self.message_id)
        ));
        if let Some(datetime) = &self.datetime {
            out.push_str(&format!("<datetime>{}</datetime>\r\n", xml::escape(datetime)));
        }
        out.push_str(&format!(
            "<{}><status><{}/></status></{}>\r\n",
            wrapper,
            self.status.as_str(),
            wrapper
        ));
        out.push_str("</imdn>");
        out
    }
}

/// Parses an IMDN document from XML.
pub fn parse_imdn(input: &str) -> Result<ImdnDocument, ImdnError> {
    if input.len() > MAX_PARSE_SIZE {
        return Err(ImdnError::InputTooLarge {
            max: MAX_PARSE_SIZE,
            actual: input.len(),
        });
    }
    if !xml::has_element(input, "imdn") {
        return Err(ImdnError::ParseError("missing imdn element".to_string()));
    }

    let message_id = xml::element_text(input, "message-id").ok_or(ImdnError::MissingMessageId)?;
    if message_id.is_empty() {
        return Err(ImdnError::MissingMessageId);
    }

    let status_section =
        xml::element_text(input, "status").ok_or(ImdnError::MissingStatus)?;
    let status = if xml::has_element(status_section, "displayed") {
        DeliveryStatus::Displayed
    } else if xml::has_element(status_section, "delivered") {
        DeliveryStatus::Delivered
    } else if xml::has_element(status_section, "failed") {
        DeliveryStatus::Failed
    } else {
        return Err(ImdnError::MissingStatus);
    };

    Ok(ImdnDocument {
        message_id: SmolStr::new(message_id),
        datetime: xml::element_text(input, "datetime").map(SmolStr::new),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_parse_delivered() {
        let doc = ImdnDocument::new("34jk324j", DeliveryStatus::Delivered)
            .with_datetime("2026-01-15T10:30:00Z");
        let parsed = parse_imdn(&doc.to_xml()).unwrap();
        assert_eq!(parsed.message_id.as_str(), "34jk324j");
        assert_eq!(parsed.status, DeliveryStatus::Delivered);
        assert_eq!(parsed.datetime.as_deref(), Some("2026-01-15T10:30:00Z"));
    }

    #[test]
    fn displayed_uses_display_notification_wrapper() {
        let doc = ImdnDocument::new("m1", DeliveryStatus::Displayed);
        let xml = doc.to_xml();
        assert!(xml.contains("<display-notification>"));
        assert_eq!(parse_imdn(&xml).unwrap().status, DeliveryStatus::Displayed);
    }

    #[test]
    fn parse_sample_document() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <imdn xmlns=\"urn:ietf:params:xml:ns:imdn\">\
            <message-id>34jk324j</message-id>\
            <datetime>2008-04-04T12:16:49-05:00</datetime>\
            <display-notification><status><displayed/></status></display-notification>\
            </imdn>";
        let doc = parse_imdn(xml).unwrap();
        assert_eq!(doc.message_id.as_str(), "34jk324j");
        assert_eq!(doc.status, DeliveryStatus::Displayed);
    }

    #[test]
    fn reject_document_without_status() {
        let xml = "<imdn><message-id>x</message-id></imdn>";
        assert_eq!(parse_imdn(xml), Err(ImdnError::MissingStatus));
    }

    #[test]
    fn reject_document_without_message_id() {
        let xml = "<imdn><status><delivered/></status></imdn>";
        assert_eq!(parse_imdn(xml), Err(ImdnError::MissingMessageId));
    }

    #[test]
    fn forward_transitions_only() {
        let status = DeliveryStatus::Sent;
        let status = status.advance(DeliveryStatus::Delivered).unwrap();
        let status = status.advance(DeliveryStatus::Displayed).unwrap();
        assert_eq!(status, DeliveryStatus::Displayed);

        // Going back to delivered is rejected and the state stays displayed
        assert!(status.advance(DeliveryStatus::Delivered).is_err());
        assert!(status.advance(DeliveryStatus::Displayed).is_err());
    }

    #[test]
    fn failed_is_accepted_unconditionally_and_terminal() {
        assert_eq!(
            DeliveryStatus::Sent.advance(DeliveryStatus::Failed),
            Ok(DeliveryStatus::Failed)
        );
        assert_eq!(
            DeliveryStatus::Displayed.advance(DeliveryStatus::Failed),
            Ok(DeliveryStatus::Failed)
        );
        assert!(DeliveryStatus::Failed
            .advance(DeliveryStatus::Delivered)
            .is_err());
    }
}
