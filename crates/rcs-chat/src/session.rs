// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chat session core.
//!
//! One [`ChatSession`] owns one conversation: its dialog path, MSRP media
//! plane, delivery tracker, composing tracker, and activity manager. The
//! session variants (one-to-one, ad-hoc group, store-and-forward) share this
//! core and differ only in invitation policy and content building, carried
//! by [`ChatVariant`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::{mpsc, Notify};

use rcs_core::{
    build_is_composing, extract_capabilities, generate_message_id, mime, parse_cpim,
    parse_file_info, parse_geoloc_document, parse_imdn, CpimEnvelope, DeliveryStatus,
    GeolocMessage, GeolocPush, InstantMessage, Request, SipUri,
};
use rcs_dialog::{DialogPath, DialogState};
use rcs_msrp::{
    classify_fault, MediaFault, MsrpChunk, MsrpChunkKind, MsrpEvent, MsrpManager,
    MsrpTransportFactory,
};
use rcs_observe::engine_metrics;

use crate::activity::ActivityManager;
use crate::composing::ComposingTracker;
use crate::delivery::DeliveryTracker;
use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus, TerminationReason};
use crate::registry::SessionRegistry;
use crate::settings::RcsSettings;
use crate::store::{ContactManager, MessageStore};
use crate::transaction::SignalingTransport;

/// Session variant tag; behavior that differs between variants branches on
/// this instead of an inheritance tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatVariant {
    OneToOneOriginating,
    OneToOneTerminating,
    GroupOriginating,
    GroupTerminating {
        /// Invite carried no participant list: rejoin/restart of a known chat
        rejoin: bool,
    },
    /// Store-and-forward push of messages missed while offline
    StoreForwardMessage,
    /// Store-and-forward push of delivery notifications
    StoreForwardNotification,
}

impl ChatVariant {
    pub fn is_group(self) -> bool {
        matches!(
            self,
            ChatVariant::GroupOriginating | ChatVariant::GroupTerminating { .. }
        )
    }

    pub fn is_originating(self) -> bool {
        matches!(
            self,
            ChatVariant::OneToOneOriginating | ChatVariant::GroupOriginating
        )
    }

    pub fn is_store_forward(self) -> bool {
        matches!(
            self,
            ChatVariant::StoreForwardMessage | ChatVariant::StoreForwardNotification
        )
    }

    pub fn kind_str(self) -> &'static str {
        match self {
            ChatVariant::OneToOneOriginating => "one2one-originating",
            ChatVariant::OneToOneTerminating => "one2one-terminating",
            ChatVariant::GroupOriginating => "group-originating",
            ChatVariant::GroupTerminating { .. } => "group-terminating",
            ChatVariant::StoreForwardMessage => "standfw-message",
            ChatVariant::StoreForwardNotification => "standfw-notification",
        }
    }
}

/// Collaborators and identity shared by every session.
#[derive(Clone)]
pub struct ChatContext {
    pub settings: Arc<RcsSettings>,
    pub store: Arc<dyn MessageStore>,
    pub contacts: Arc<dyn ContactManager>,
    pub signaling: Arc<dyn SignalingTransport>,
    pub msrp_factory: Arc<dyn MsrpTransportFactory>,
    pub registry: Arc<SessionRegistry>,
    /// Concurrent file-transfer session count, for the over-quota check
    pub active_ft_sessions: Arc<AtomicUsize>,
    pub local_ip: SmolStr,
    pub local_party: SipUri,
    pub local_msrp_port: u16,
}

/// Outcome of the user decision on a ringing invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationAnswer {
    Accepted,
    Rejected,
    Cancelled,
}

pub struct ChatSession {
    pub(crate) ctx: ChatContext,
    variant: ChatVariant,
    session_id: SmolStr,
    contribution_id: SmolStr,
    subject: Option<SmolStr>,
    pub(crate) dialog: Mutex<DialogPath>,
    pub(crate) participants: Mutex<Vec<SipUri>>,
    remote_party: SipUri,
    pub(crate) feature_tags: Vec<SmolStr>,
    /// First message (or file-info announcement) carried in the invite
    pub(crate) first_message: Option<InstantMessage>,
    pub(crate) msrp: MsrpManager,
    pub(crate) delivery: DeliveryTracker,
    events: Arc<EventBus>,
    pub(crate) activity: Arc<ActivityManager>,
    composing: Arc<ComposingTracker>,
    remote_geoloc_supported: AtomicBool,
    remote_ft_supported: AtomicBool,
    interrupted: AtomicBool,
    answer: Mutex<Option<InvitationAnswer>>,
    answer_notify: Notify,
    pub(crate) shutdown: Notify,
    /// The incoming invite, for terminating variants
    pub(crate) invite: Option<Request>,
    media_events_tx: mpsc::UnboundedSender<MsrpEvent>,
    media_events_rx: Mutex<Option<mpsc::UnboundedReceiver<MsrpEvent>>>,
}

impl ChatSession {
    pub(crate) fn build(
        ctx: ChatContext,
        variant: ChatVariant,
        dialog: DialogPath,
        contribution_id: SmolStr,
        subject: Option<SmolStr>,
        remote_party: SipUri,
        participants: Vec<SipUri>,
        first_message: Option<InstantMessage>,
        invite: Option<Request>,
    ) -> Arc<Self> {
        let mut msrp = MsrpManager::new(&ctx.local_ip, ctx.local_msrp_port);
        msrp.set_secured(ctx.settings.msrp_secured);

        let events = Arc::new(EventBus::new());
        let composing_events = events.clone();
        let composing = ComposingTracker::new(move |contact, active| {
            composing_events.emit(ChatEvent::ComposingStateChanged {
                contact: SmolStr::new(contact),
                active,
            });
        });

        let feature_tags = rcs_core::build_supported_tags(
            &ctx.settings.capabilities,
            ctx.settings.network_access,
        );
        let (media_events_tx, media_events_rx) = mpsc::unbounded_channel();
        let delivery = DeliveryTracker::new(ctx.store.clone(), ctx.signaling.clone());
        let activity = ActivityManager::new(ctx.settings.chat_idle_timeout);

        let session = Arc::new(Self {
            session_id: dialog.call_id.clone(),
            contribution_id,
            subject,
            dialog: Mutex::new(dialog),
            participants: Mutex::new(participants),
            remote_party,
            feature_tags,
            first_message,
            msrp,
            delivery,
            events,
            activity,
            composing,
            remote_geoloc_supported: AtomicBool::new(false),
            remote_ft_supported: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            answer: Mutex::new(None),
            answer_notify: Notify::new(),
            shutdown: Notify::new(),
            invite,
            media_events_tx,
            media_events_rx: Mutex::new(Some(media_events_rx)),
            variant,
            ctx,
        });
        engine_metrics().on_session_created(variant.kind_str());
        session
    }

    pub fn session_id(&self) -> &SmolStr {
        &self.session_id
    }

    pub fn contribution_id(&self) -> &SmolStr {
        &self.contribution_id
    }

    pub fn subject(&self) -> Option<&SmolStr> {
        self.subject.as_ref()
    }

    pub fn variant(&self) -> ChatVariant {
        self.variant
    }

    pub fn remote_party(&self) -> &SipUri {
        &self.remote_party
    }

    pub fn participants(&self) -> Vec<SipUri> {
        self.participants.lock().clone()
    }

    pub fn first_message(&self) -> Option<&InstantMessage> {
        self.first_message.as_ref()
    }

    /// Registers an event subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn is_geoloc_supported_by_remote(&self) -> bool {
        self.remote_geoloc_supported.load(Ordering::Relaxed)
    }

    pub fn is_file_transfer_supported_by_remote(&self) -> bool {
        self.remote_ft_supported.load(Ordering::Relaxed)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    pub fn dialog_state(&self) -> DialogState {
        self.dialog.lock().state()
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        self.events.emit(event);
    }

    pub(crate) fn media_events_tx(&self) -> mpsc::UnboundedSender<MsrpEvent> {
        self.media_events_tx.clone()
    }

    pub(crate) fn take_media_events_rx(
        &self,
    ) -> Option<mpsc::UnboundedReceiver<MsrpEvent>> {
        self.media_events_rx.lock().take()
    }

    /// Learns remote support flags from the peer's feature tags.
    pub(crate) fn learn_remote_capabilities(&self, tag_list: &[SmolStr]) {
        let caps = extract_capabilities(tag_list, None, &self.ctx.settings.media_catalog);
        self.remote_geoloc_supported
            .store(caps.geolocation_push, Ordering::Relaxed);
        self.remote_ft_supported.store(
            caps.file_transfer || caps.file_transfer_http,
            Ordering::Relaxed,
        );
    }

    // ------------------------------------------------------------------
    // Invitation answer plumbing
    // ------------------------------------------------------------------

    /// Accepts a ringing invitation.
    pub fn accept_invitation(&self) {
        self.put_answer(InvitationAnswer::Accepted);
    }

    /// Rejects a ringing invitation; a decline is sent to the peer.
    pub fn reject_invitation(&self) {
        self.put_answer(InvitationAnswer::Rejected);
    }

    /// Signals that the peer cancelled the pending invitation.
    pub fn cancel_invitation(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
        self.put_answer(InvitationAnswer::Cancelled);
    }

    fn put_answer(&self, answer: InvitationAnswer) {
        let mut guard = self.answer.lock();
        if guard.is_none() {
            *guard = Some(answer);
            // notify_one stores a permit, so an answer arriving before the
            // flow registers its waiter is not lost
            self.answer_notify.notify_one();
        }
    }

    /// Blocks until the invitation is answered, cancelled, or times out.
    /// `None` means not answered within the ringing period.
    pub(crate) async fn wait_invitation_answer(&self) -> Option<InvitationAnswer> {
        let timeout = self.ctx.settings.ringing_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(answer) = *self.answer.lock() {
                return Some(answer);
            }
            tokio::select! {
                _ = self.answer_notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return self.answer.lock().take();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Media plane
    // ------------------------------------------------------------------

    /// Spawns the media event loop, bound to the session lifetime.
    pub(crate) fn spawn_media_loop(self: &Arc<Self>) {
        let Some(mut rx) = self.take_media_events_rx() else {
            return;
        };
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => session.handle_media_event(event).await,
                        None => break,
                    },
                    _ = session.shutdown.notified() => break,
                }
            }
        });
    }

    /// Spawns the inactivity watcher, bound to the session lifetime.
    pub(crate) fn spawn_activity_watcher(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if session.activity.wait_idle().await {
                tracing::debug!(session = %session.session_id, "chat inactivity timeout");
                session.abort_session(TerminationReason::ByTimeout).await;
            }
        });
    }

    pub(crate) async fn handle_media_event(self: &Arc<Self>, event: MsrpEvent) {
        match event {
            MsrpEvent::DataReceived {
                message_id,
                mime_type,
                data,
            } => {
                self.activity.update();
                self.receive_media_data(&message_id, &mime_type, &data).await;
            }
            MsrpEvent::TransferProgress { .. } => {
                // Chat chunks are small; progress is only meaningful for
                // file transfer sessions
            }
            MsrpEvent::MessageSent { .. } => {
                self.activity.update();
            }
            MsrpEvent::TransferError {
                message_id,
                status,
                kind,
            } => {
                self.handle_transfer_error(&message_id, status, kind).await;
            }
            MsrpEvent::Closed => {
                tracing::debug!(session = %self.session_id, "media transport closed");
            }
        }
    }

    /// Inbound MSRP framing: branch on the wire MIME type.
    async fn receive_media_data(self: &Arc<Self>, msrp_message_id: &SmolStr, mime_type: &str, data: &[u8]) {
        if data.is_empty() {
            tracing::debug!("by-passing empty media chunk");
            return;
        }
        engine_metrics().on_message_received(mime_type);

        if mime::is_composing(mime_type) {
            self.composing
                .receive_event(self.remote_party.base().as_str(), data);
        } else if mime::is_text_plain(mime_type) {
            // Bare text message, no delivery metadata
            let text = String::from_utf8_lossy(data).into_owned();
            self.receive_text(
                &self.remote_party.base(),
                text,
                msrp_message_id,
                false,
                SystemTime::now(),
                None,
            );
        } else if mime::is_message_cpim(mime_type) {
            let text = String::from_utf8_lossy(data);
            match parse_cpim(&text) {
                Ok(envelope) => self.receive_envelope(msrp_message_id, envelope).await,
                Err(e) => {
                    tracing::error!(error = %e, "cannot parse cpim envelope; dropping message");
                }
            }
        } else {
            tracing::debug!(mime_type, "unsupported content in chat session");
        }
    }

    /// Second-level branch on the envelope's inner content type.
    async fn receive_envelope(self: &Arc<Self>, msrp_message_id: &SmolStr, envelope: CpimEnvelope) {
        let message_id = envelope
            .message_id
            .clone()
            .unwrap_or_else(|| msrp_message_id.clone());
        let from = if envelope.from.as_str() == rcs_core::ANONYMOUS_URI {
            self.remote_party.base()
        } else {
            strip_angle_brackets(&envelope.from)
        };
        let date = SystemTime::now();
        let inner = envelope.content_type.clone();

        let is_ft_http = mime::is_ft_http(&inner);
        let displayed_requested = envelope.wants_display();

        // A file-transfer announcement always elicits a delivered report;
        // otherwise honor the positive-delivery request.
        if is_ft_http || envelope.wants_positive_delivery() {
            self.send_delivery_report(&message_id, DeliveryStatus::Delivered)
                .await;
        }

        if is_ft_http {
            self.receive_http_file_transfer(&from, &message_id, envelope.body());
        } else if mime::is_text_plain(&inner) {
            let text = String::from_utf8_lossy(envelope.body()).into_owned();
            self.receive_text(&from, text, &message_id, displayed_requested, date, None);
            if displayed_requested && self.ctx.settings.displayed_notification_activated {
                self.ctx.store.set_displayed_report_pending(&message_id);
            }
        } else if mime::is_composing(&inner) {
            self.composing.receive_event(&from, envelope.body());
        } else if mime::is_imdn(&inner) {
            self.receive_delivery_report(&from, envelope.body());
        } else if mime::is_geoloc(&inner) {
            self.receive_geoloc(&from, &message_id, displayed_requested, date, envelope.body());
        } else {
            tracing::debug!(inner = %inner, "unsupported wrapped content");
        }
    }

    fn receive_text(
        &self,
        from: &str,
        text: String,
        message_id: &str,
        displayed_requested: bool,
        date: SystemTime,
        display_name: Option<&str>,
    ) {
        // Composing state resets even for duplicates
        self.composing.set_idle(from);

        if !self.ctx.store.mark_seen(&self.contribution_id, message_id) {
            tracing::debug!(message_id, "duplicate message suppressed");
            return;
        }

        let mut message = InstantMessage::new(message_id, from, text)
            .with_displayed_report_requested(displayed_requested)
            .with_display_name(display_name);
        message.date = date;
        self.ctx.store.insert_message(&self.contribution_id, &message);
        self.emit(ChatEvent::MessageReceived(message));
    }

    fn receive_geoloc(
        &self,
        from: &str,
        message_id: &str,
        displayed_requested: bool,
        date: SystemTime,
        body: &[u8],
    ) {
        self.composing.set_idle(from);
        let text = String::from_utf8_lossy(body);
        let geoloc = match parse_geoloc_document(&text) {
            Ok(geoloc) => geoloc,
            Err(e) => {
                tracing::error!(error = %e, "cannot parse geolocation document; dropping message");
                return;
            }
        };
        if !self.ctx.store.mark_seen(&self.contribution_id, message_id) {
            return;
        }
        self.emit(ChatEvent::GeolocReceived(GeolocMessage {
            message_id: SmolStr::new(message_id),
            remote: SmolStr::new(from),
            geoloc,
            date,
            display_name: None,
            displayed_report_requested: displayed_requested,
        }));
    }

    fn receive_delivery_report(&self, from: &str, body: &[u8]) {
        let text = String::from_utf8_lossy(body);
        let document = match parse_imdn(&text) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "cannot parse imdn document; dropping report");
                return;
            }
        };
        if let Some(status) = self.delivery.apply_report(&document) {
            self.emit(ChatEvent::DeliveryStatusChanged {
                message_id: document.message_id.clone(),
                status,
                contact: Some(SmolStr::new(from)),
            });
        }
    }

    /// Pre-flight checks for an announced HTTP file transfer. Failing
    /// invitations are dropped silently; no in-protocol rejection is sent.
    /// TODO: decide with interworking whether a rejection MESSAGE should go
    /// back to the originating side instead of the silent drop.
    pub(crate) fn receive_http_file_transfer(&self, from: &str, message_id: &str, body: &[u8]) {
        let info = match parse_file_info(body) {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(error = %e, "cannot parse file-info document; dropping invitation");
                return;
            }
        };

        if self.ctx.contacts.is_ft_blocked(from) {
            tracing::warn!(contact = from, "contact blocked; dropping file transfer invitation");
            engine_metrics().on_invitation_dropped("blocked-contact");
            return;
        }
        let max_size = self.ctx.settings.max_file_transfer_size;
        if max_size > 0 && info.file_size > max_size {
            tracing::warn!(size = info.file_size, "file too big; dropping file transfer invitation");
            engine_metrics().on_invitation_dropped("file-too-big");
            return;
        }
        let max_sessions = self.ctx.settings.max_file_transfer_sessions;
        if max_sessions > 0 && self.ctx.active_ft_sessions.load(Ordering::Relaxed) >= max_sessions
        {
            tracing::warn!("file transfer quota reached; dropping invitation");
            engine_metrics().on_invitation_dropped("over-quota");
            return;
        }

        if !self.ctx.store.mark_seen(&self.contribution_id, message_id) {
            return;
        }
        self.emit(ChatEvent::FileTransferInvitation {
            contact: SmolStr::new(from),
            message_id: SmolStr::new(message_id),
            info,
        });
    }

    async fn handle_transfer_error(
        self: &Arc<Self>,
        message_id: &SmolStr,
        status: Option<u16>,
        kind: MsrpChunkKind,
    ) {
        if self.is_interrupted() {
            return;
        }
        tracing::info!(
            %message_id,
            ?status,
            kind = kind.as_str(),
            "media transfer error"
        );

        // First handle the affected message
        match kind {
            MsrpChunkKind::DeliveredReport => {
                let dialog = self.dialog.lock().clone();
                self.delivery
                    .send_via_signaling(&dialog, message_id, DeliveryStatus::Delivered)
                    .await;
            }
            MsrpChunkKind::DisplayedReport => {
                let dialog = self.dialog.lock().clone();
                self.delivery
                    .send_via_signaling(&dialog, message_id, DeliveryStatus::Displayed)
                    .await;
            }
            MsrpChunkKind::TextMessage | MsrpChunkKind::Geoloc if !message_id.is_empty() => {
                self.delivery
                    .record_local_status(message_id, DeliveryStatus::Failed);
                self.emit(ChatEvent::DeliveryStatusChanged {
                    message_id: message_id.clone(),
                    status: DeliveryStatus::Failed,
                    contact: None,
                });
            }
            _ => {
                tracing::debug!("media transfer error not handled per-message");
            }
        }

        // Then decide the session's fate
        let reason = format!("transfer error (status {:?})", status);
        match classify_fault(status) {
            MediaFault::Broken => {
                self.emit(ChatEvent::Error(ChatError::MediaSessionBroken { reason }));
            }
            MediaFault::Failed => {
                self.handle_error(ChatError::MediaSessionFailed { reason }).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Outbound sending
    // ------------------------------------------------------------------

    fn envelope_addresses(&self) -> (String, String) {
        if self.variant.is_group() {
            (
                self.ctx.local_party.to_string(),
                self.dialog.lock().target.to_string(),
            )
        } else {
            (
                rcs_core::ANONYMOUS_URI.to_owned(),
                rcs_core::ANONYMOUS_URI.to_owned(),
            )
        }
    }

    fn build_outgoing_envelope(
        &self,
        content_type: &str,
        body: &[u8],
        message_id: Option<&str>,
    ) -> Result<String, ChatError> {
        let (from, to) = self.envelope_addresses();
        let mut envelope = CpimEnvelope::new(content_type, Bytes::copy_from_slice(body))
            .and_then(|e| e.with_from(&from))
            .and_then(|e| e.with_to(&to))
            .map_err(|e| ChatError::UnexpectedException {
                reason: e.to_string(),
            })?;
        if let Some(message_id) = message_id {
            envelope = envelope
                .with_imdn_message_id(message_id)
                .and_then(|e| {
                    let mut tokens = vec![rcs_core::cpim::POSITIVE_DELIVERY];
                    if self.ctx.settings.displayed_notification_activated {
                        tokens.push(rcs_core::cpim::DISPLAY);
                    }
                    e.with_disposition(&tokens)
                })
                .map_err(|e| ChatError::UnexpectedException {
                    reason: e.to_string(),
                })?;
        }
        Ok(envelope.to_wire())
    }

    async fn send_wrapped(
        self: &Arc<Self>,
        message_id: &SmolStr,
        inner_type: &str,
        body: &[u8],
        kind: MsrpChunkKind,
        with_imdn: bool,
    ) -> Result<(), ChatError> {
        let imdn_id = if with_imdn && self.ctx.settings.imdn_activated {
            Some(message_id.as_str())
        } else {
            None
        };
        let cpim = self.build_outgoing_envelope(inner_type, body, imdn_id)?;
        let chunk = MsrpChunk::new(
            message_id.clone(),
            mime::MESSAGE_CPIM,
            Bytes::from(cpim.into_bytes()),
            kind,
        );
        self.msrp.send_chunk(chunk).await.map_err(|e| {
            let status = match e {
                rcs_msrp::MsrpError::SendRejected { status } => Some(status),
                _ => None,
            };
            match classify_fault(status) {
                MediaFault::Broken => ChatError::MediaSessionBroken {
                    reason: e.to_string(),
                },
                MediaFault::Failed => ChatError::MediaSessionFailed {
                    reason: e.to_string(),
                },
            }
        })?;
        engine_metrics().on_message_sent(inner_type);
        self.activity.update();
        Ok(())
    }

    /// Sends a text message; returns its message id.
    pub async fn send_text(self: &Arc<Self>, text: &str) -> Result<SmolStr, ChatError> {
        let message_id = generate_message_id();
        self.send_wrapped(
            &message_id,
            mime::TEXT_PLAIN,
            text.as_bytes(),
            MsrpChunkKind::TextMessage,
            true,
        )
        .await
        .map_err(|e| {
            self.delivery
                .record_local_status(&message_id, DeliveryStatus::Failed);
            e
        })?;

        let message = InstantMessage::new(&message_id, &self.remote_party.base(), text);
        self.ctx.store.insert_message(&self.contribution_id, &message);
        Ok(message_id)
    }

    /// Sends a geolocation push; returns its message id.
    pub async fn send_geoloc(self: &Arc<Self>, geoloc: &GeolocPush) -> Result<SmolStr, ChatError> {
        let message_id = generate_message_id();
        let document = geoloc.to_xml();
        self.send_wrapped(
            &message_id,
            mime::GEOLOC,
            document.as_bytes(),
            MsrpChunkKind::Geoloc,
            true,
        )
        .await?;
        Ok(message_id)
    }

    /// Sends the local composing state.
    pub async fn send_is_composing(self: &Arc<Self>, active: bool) -> Result<(), ChatError> {
        let document = build_is_composing(active, rcs_core::iscomposing::DEFAULT_REFRESH);
        self.send_wrapped(
            &generate_message_id(),
            mime::IS_COMPOSING,
            document.as_bytes(),
            MsrpChunkKind::IsComposing,
            false,
        )
        .await
    }

    /// Sends a delivery/displayed report over the media plane, falling back
    /// to the signaling plane when the MSRP send fails.
    pub async fn send_delivery_report(self: &Arc<Self>, message_id: &str, status: DeliveryStatus) {
        // Store-and-forward notification sessions only carry reports, they
        // never generate their own.
        if self.variant == ChatVariant::StoreForwardNotification {
            return;
        }

        let Some(cpim) = self.delivery.build_report(message_id, status) else {
            return;
        };
        let kind = match status {
            DeliveryStatus::Displayed => MsrpChunkKind::DisplayedReport,
            DeliveryStatus::Delivered => MsrpChunkKind::DeliveredReport,
            _ => MsrpChunkKind::OtherStatusReport,
        };
        let chunk = MsrpChunk::new(
            generate_message_id(),
            mime::MESSAGE_CPIM,
            Bytes::from(cpim.into_bytes()),
            kind,
        );
        match self.msrp.send_chunk(chunk).await {
            Ok(()) => {
                tracing::debug!(message_id, status = status.as_str(), "delivery report sent");
                let _ = self.ctx.store.set_status(message_id, status);
            }
            Err(e) => {
                tracing::info!(
                    message_id,
                    error = %e,
                    "media-plane report failed; falling back to signaling"
                );
                let dialog = self.dialog.lock().clone();
                self.delivery
                    .send_via_signaling(&dialog, &SmolStr::new(message_id), status)
                    .await;
            }
        }
    }

    /// Sends the empty keep-alive chunk.
    pub(crate) async fn send_empty_chunk(&self) {
        if let Err(e) = self.msrp.send_empty_chunk().await {
            tracing::error!(error = %e, "problem while sending empty chunk");
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    pub(crate) async fn close_media_session(&self) {
        self.msrp.close_session().await;
    }

    /// Aborts the session locally (user action or inactivity).
    pub async fn abort_session(self: &Arc<Self>, reason: TerminationReason) {
        tracing::info!(session = %self.session_id, reason = reason.as_str(), "abort session");
        self.interrupted.store(true, Ordering::Relaxed);
        self.shutdown.notify_waiters();
        self.activity.stop();
        self.close_media_session().await;

        {
            let mut dialog = self.dialog.lock();
            if !dialog.state().is_terminal() {
                let _ = dialog.terminated();
            }
        }
        self.ctx.registry.remove(&self.session_id);
        engine_metrics().on_session_terminated(self.variant.kind_str(), reason.as_str());
        self.emit(ChatEvent::SessionAborted { reason });
    }

    /// Handles a BYE from the peer.
    pub async fn handle_remote_bye(self: &Arc<Self>) {
        self.abort_session(TerminationReason::ByRemote).await;
    }

    /// Error path shared by every flow: close media, drop the session, then
    /// notify listeners unless we were interrupted on purpose.
    pub(crate) async fn handle_error(self: &Arc<Self>, error: ChatError) {
        tracing::info!(
            session = %self.session_id,
            kind = error.kind(),
            error = %error,
            "session error"
        );
        self.shutdown.notify_waiters();
        self.activity.stop();
        self.close_media_session().await;
        {
            let mut dialog = self.dialog.lock();
            if !dialog.state().is_terminal() {
                let _ = dialog.terminated();
            }
        }
        self.ctx.registry.remove(&self.session_id);
        engine_metrics().on_session_terminated(self.variant.kind_str(), error.kind());
        if !self.is_interrupted() {
            self.emit(ChatEvent::Error(error));
        }
    }
}

pub(crate) fn strip_angle_brackets(value: &str) -> String {
    let trimmed = value.trim();
    match (trimmed.find('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => trimmed[start + 1..end].to_owned(),
        _ => trimmed.to_owned(),
    }
}
