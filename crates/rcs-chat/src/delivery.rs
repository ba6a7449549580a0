// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Delivery-status tracking (IMDN).
//!
//! Builds and applies delivery reports. Status updates persist through the
//! message-store collaborator, which enforces the forward-only progression;
//! when a report cannot travel over the media plane the tracker falls back
//! to a pager-mode MESSAGE on the signaling plane.

use std::sync::Arc;

use rcs_core::{CpimEnvelope, DeliveryStatus, ImdnDocument, ANONYMOUS_URI};
use rcs_dialog::DialogPath;
use rcs_observe::engine_metrics;
use smol_str::SmolStr;

use crate::store::MessageStore;
use crate::transaction::{create_pager_message, SignalingTransport};

/// Per-session delivery-status tracker.
pub struct DeliveryTracker {
    store: Arc<dyn MessageStore>,
    signaling: Arc<dyn SignalingTransport>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn MessageStore>, signaling: Arc<dyn SignalingTransport>) -> Self {
        Self { store, signaling }
    }

    /// Builds the CPIM-wrapped report document for the media plane.
    pub fn build_report(&self, message_id: &str, status: DeliveryStatus) -> Option<String> {
        let imdn = ImdnDocument::new(message_id, status).to_xml();
        let envelope = CpimEnvelope::new(rcs_core::mime::IMDN, imdn.into_bytes())
            .ok()?
            .with_from(ANONYMOUS_URI)
            .ok()?
            .with_to(ANONYMOUS_URI)
            .ok()?;
        Some(envelope.to_wire())
    }

    /// Applies an inbound report. Returns the new status when the update
    /// moved forward, None when it was rejected or the message is unknown.
    pub fn apply_report(&self, document: &ImdnDocument) -> Option<DeliveryStatus> {
        match self.store.set_status(&document.message_id, document.status) {
            Ok(status) => {
                engine_metrics().on_delivery_report(status.as_str());
                Some(status)
            }
            Err(e) => {
                tracing::debug!(
                    message_id = %document.message_id,
                    error = %e,
                    "rejected delivery status update"
                );
                None
            }
        }
    }

    /// Records an update originated locally (e.g. a send failure).
    pub fn record_local_status(&self, message_id: &str, status: DeliveryStatus) {
        if let Err(e) = self.store.set_status(message_id, status) {
            tracing::debug!(message_id, error = %e, "local status update rejected");
        }
    }

    /// Sends a report over the signaling plane, used when the media plane
    /// rejected the report chunk. Failure here is logged and dropped.
    pub async fn send_via_signaling(
        &self,
        dialog: &DialogPath,
        message_id: &SmolStr,
        status: DeliveryStatus,
    ) {
        let Some(cpim) = self.build_report(message_id, status) else {
            return;
        };
        let request = create_pager_message(dialog, &cpim);
        match self.signaling.send_request(request).await {
            Ok(response) if response.is_success() => {
                tracing::debug!(%message_id, status = status.as_str(), "delivery report sent via signaling");
                let _ = self.store.set_status(message_id, status);
            }
            Ok(response) => {
                tracing::warn!(%message_id, code = response.code, "signaling delivery report rejected");
            }
            Err(e) => {
                tracing::warn!(%message_id, error = %e, "signaling delivery report failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMessageStore;
    use crate::transaction::SignalingTransport;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use rcs_core::{parse_cpim, parse_imdn, Headers, InstantMessage, Request, Response, SipUri};
    use std::time::Duration;

    struct RecordingSignaling {
        requests: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl SignalingTransport for RecordingSignaling {
        async fn send_request(
            &self,
            request: Request,
        ) -> Result<Response, crate::error::SignalingError> {
            self.requests.lock().push(request);
            Ok(Response::new(200, "OK", Headers::new(), Bytes::new()))
        }

        async fn send_response(
            &self,
            _response: Response,
        ) -> Result<(), crate::error::SignalingError> {
            Ok(())
        }

        async fn wait_ack(
            &self,
            _call_id: &str,
            _timeout: Duration,
        ) -> Result<(), crate::error::SignalingError> {
            Ok(())
        }
    }

    fn tracker() -> (DeliveryTracker, Arc<InMemoryMessageStore>, Arc<RecordingSignaling>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let signaling = Arc::new(RecordingSignaling {
            requests: Mutex::new(Vec::new()),
        });
        (
            DeliveryTracker::new(store.clone(), signaling.clone()),
            store,
            signaling,
        )
    }

    #[test]
    fn report_is_cpim_wrapped_imdn() {
        let (tracker, _, _) = tracker();
        let wire = tracker
            .build_report("m1", DeliveryStatus::Delivered)
            .unwrap();
        let envelope = parse_cpim(&wire).unwrap();
        assert_eq!(envelope.content_type.as_str(), rcs_core::mime::IMDN);
        let doc = parse_imdn(envelope.body_as_str().unwrap()).unwrap();
        assert_eq!(doc.message_id.as_str(), "m1");
        assert_eq!(doc.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn forward_sequence_applies_backward_rejected() {
        let (tracker, store, _) = tracker();
        store.insert_message("c1", &InstantMessage::new("m1", "sip:a@x", "hi"));

        let delivered = ImdnDocument::new("m1", DeliveryStatus::Delivered);
        let displayed = ImdnDocument::new("m1", DeliveryStatus::Displayed);

        assert_eq!(tracker.apply_report(&delivered), Some(DeliveryStatus::Delivered));
        assert_eq!(tracker.apply_report(&displayed), Some(DeliveryStatus::Displayed));
        // Backward update is rejected and the state remains displayed
        assert_eq!(tracker.apply_report(&delivered), None);
        assert_eq!(store.status("m1"), Some(DeliveryStatus::Displayed));
    }

    #[tokio::test]
    async fn signaling_fallback_sends_pager_message() {
        let (tracker, store, signaling) = tracker();
        store.insert_message("c1", &InstantMessage::new("m9", "sip:a@x", "hi"));
        let dialog = DialogPath::originating(
            SipUri::parse("sip:bob@example.com").unwrap(),
            SipUri::parse("sip:alice@example.com").unwrap(),
            SipUri::parse("sip:bob@example.com").unwrap(),
            vec![],
        );

        tracker
            .send_via_signaling(&dialog, &SmolStr::new("m9"), DeliveryStatus::Delivered)
            .await;

        let requests = signaling.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, rcs_core::Method::Message);
        let body = String::from_utf8(requests[0].body.to_vec()).unwrap();
        assert!(body.contains("<delivered/>"));
        drop(requests);
        assert_eq!(store.status("m9"), Some(DeliveryStatus::Delivered));
    }
}
