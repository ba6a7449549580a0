// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Session constructors and invitation flows.
//!
//! Outgoing sessions build their negotiation content (plain SDP, or a
//! multipart body when a first message or file announcement rides along),
//! send the INVITE, and establish media from the answer. Incoming sessions
//! either auto-accept or ring, then answer the offer, open the media plane
//! in the negotiated role, and confirm on ACK.

use std::sync::Arc;

use smol_str::SmolStr;

use rcs_core::{
    collect_feature_tags, extract_tag, generate_message_id, mime,
    multipart::{boundary_from_content_type, build_multipart, parse_multipart},
    parse_cpim, FileTransferHttpInfo, InstantMessage, Request, SipUri,
};
use rcs_dialog::DialogPath;
use rcs_msrp::MsrpRole;
use rcs_sdp::{
    build_chat_sdp, create_setup_answer, create_setup_offer, parse_sdp, ChatSdpParams, SetupMode,
    ACTIVE_SETUP_PORT,
};

use crate::error::{ChatError, SignalingError};
use crate::events::{ChatEvent, TerminationReason};
use crate::session::{strip_angle_brackets, ChatContext, ChatSession, ChatVariant, InvitationAnswer};
use crate::transaction::{
    create_invite, create_response, parse_resource_list, CONTRIBUTION_ID_HEADER,
};

const SDP_DIRECTION_SENDRECV: &str = "sendrecv";

/// Stable conversation identity derived from the call-id for originating
/// sessions.
pub(crate) fn contribution_id_from_call_id(call_id: &str) -> SmolStr {
    SmolStr::new(format!("{:x}", md5::compute(call_id.as_bytes())))
}

/// Media parameters read from the peer's chat SDP.
pub(crate) struct RemoteMedia {
    pub host: SmolStr,
    pub port: u16,
    pub path: SmolStr,
    pub setup: SetupMode,
}

pub(crate) fn remote_media_from_sdp(sdp_text: &str) -> Result<RemoteMedia, ChatError> {
    let session = parse_sdp(sdp_text).map_err(|e| ChatError::UnsupportedMediaType {
        reason: e.to_string(),
    })?;
    let media = session
        .media_of_kind("message")
        .ok_or_else(|| ChatError::UnsupportedMediaType {
            reason: "no message media in offer".to_owned(),
        })?;
    let path = media
        .attribute("path")
        .ok_or_else(|| ChatError::UnsupportedMediaType {
            reason: "no msrp path in offer".to_owned(),
        })?;
    let host = session
        .remote_host(media)
        .ok_or_else(|| ChatError::UnsupportedMediaType {
            reason: "no connection address in offer".to_owned(),
        })?;
    let setup = media
        .attribute("setup")
        .map(SetupMode::parse)
        .unwrap_or(SetupMode::Passive);

    Ok(RemoteMedia {
        host: SmolStr::new(host),
        port: media.port,
        path: SmolStr::new(path),
        setup,
    })
}

/// Parts of an incoming invite body.
pub(crate) struct InviteContent {
    pub sdp: Option<String>,
    pub first_envelope: Option<rcs_core::CpimEnvelope>,
}

pub(crate) fn split_invite_content(invite: &Request) -> InviteContent {
    let body = String::from_utf8_lossy(&invite.body).into_owned();
    let content_type = invite.content_type().unwrap_or("");

    if content_type.starts_with(mime::MULTIPART_MIXED) {
        let boundary = boundary_from_content_type(content_type).unwrap_or("boundary1");
        let mut sdp = None;
        let mut first_envelope = None;
        if let Ok(parts) = parse_multipart(&body, boundary) {
            for part in parts {
                if part.content_type.starts_with(mime::APPLICATION_SDP) {
                    sdp = Some(part.body);
                } else if mime::is_message_cpim(&part.content_type) {
                    match parse_cpim(&part.body) {
                        Ok(envelope) => first_envelope = Some(envelope),
                        Err(e) => {
                            tracing::error!(error = %e, "cannot parse invite cpim part");
                        }
                    }
                }
            }
        }
        InviteContent {
            sdp,
            first_envelope,
        }
    } else if body.is_empty() {
        InviteContent {
            sdp: None,
            first_envelope: None,
        }
    } else {
        InviteContent {
            sdp: Some(body),
            first_envelope: None,
        }
    }
}

impl ChatSession {
    /// Creates an originating one-to-one session, optionally carrying the
    /// first message in the invite.
    pub fn originating_one2one(
        ctx: ChatContext,
        remote: SipUri,
        first_text: Option<&str>,
    ) -> Arc<Self> {
        let first_message = first_text.map(|text| {
            InstantMessage::new(&generate_message_id(), &remote.base(), text)
                .with_displayed_report_requested(ctx.settings.imdn_activated)
        });
        Self::originating(
            ctx,
            ChatVariant::OneToOneOriginating,
            remote.clone(),
            None,
            vec![remote],
            first_message,
        )
    }

    /// Creates an originating one-to-one session announcing a file
    /// available over HTTP.
    ///
    /// Pre-flight: an announcement exceeding the configured maximum file
    /// size is rejected before any signaling happens.
    pub fn originating_file_transfer(
        ctx: ChatContext,
        remote: SipUri,
        info: &FileTransferHttpInfo,
    ) -> Result<Arc<Self>, ChatError> {
        let max_size = ctx.settings.max_file_transfer_size;
        if max_size > 0 && info.file_size > max_size {
            return Err(ChatError::FileTooBig);
        }
        let mut message =
            InstantMessage::new(&generate_message_id(), &remote.base(), info.to_xml());
        message.mime_type = SmolStr::new(mime::FT_HTTP);
        Ok(Self::originating(
            ctx,
            ChatVariant::OneToOneOriginating,
            remote.clone(),
            None,
            vec![remote],
            Some(message),
        ))
    }

    /// Creates an originating ad-hoc group session toward the conference
    /// factory.
    pub fn originating_group(
        ctx: ChatContext,
        conference_factory: SipUri,
        subject: Option<&str>,
        participants: Vec<SipUri>,
    ) -> Arc<Self> {
        Self::originating(
            ctx,
            ChatVariant::GroupOriginating,
            conference_factory,
            subject.map(SmolStr::new),
            participants,
            None,
        )
    }

    fn originating(
        ctx: ChatContext,
        variant: ChatVariant,
        remote: SipUri,
        subject: Option<SmolStr>,
        participants: Vec<SipUri>,
        first_message: Option<InstantMessage>,
    ) -> Arc<Self> {
        let dialog = DialogPath::originating(
            remote.clone(),
            ctx.local_party.clone(),
            remote.clone(),
            vec![],
        );
        let contribution_id = contribution_id_from_call_id(&dialog.call_id);
        Self::build(
            ctx,
            variant,
            dialog,
            contribution_id,
            subject,
            remote,
            participants,
            first_message,
            None,
        )
    }

    /// Creates a terminating session from an incoming invite.
    pub fn terminating(
        ctx: ChatContext,
        invite: Request,
        variant: ChatVariant,
    ) -> Result<Arc<Self>, ChatError> {
        let from = invite
            .headers
            .get("From")
            .ok_or_else(|| ChatError::UnexpectedException {
                reason: "invite without From header".to_owned(),
            })?;
        let remote_party =
            SipUri::parse(from).ok_or_else(|| ChatError::UnexpectedException {
                reason: format!("unparseable From header: {}", from),
            })?;
        let remote_tag = extract_tag(from).unwrap_or_default();
        let call_id = invite
            .call_id()
            .map(SmolStr::new)
            .ok_or_else(|| ChatError::UnexpectedException {
                reason: "invite without Call-ID".to_owned(),
            })?;
        let cseq = invite
            .headers
            .get("CSeq")
            .and_then(|value| value.split_whitespace().next()?.parse::<u32>().ok())
            .unwrap_or(1);
        let target = invite
            .headers
            .get("Contact")
            .and_then(|contact| SipUri::parse(contact))
            .unwrap_or_else(|| remote_party.clone());
        let route_set = invite
            .headers
            .get_all("Record-Route")
            .filter_map(|value| SipUri::parse(value))
            .collect();

        let mut dialog = DialogPath::terminating(
            call_id.clone(),
            remote_tag,
            cseq,
            target,
            ctx.local_party.clone(),
            remote_party.clone(),
            route_set,
        );

        let content = split_invite_content(&invite);
        if let Some(sdp) = &content.sdp {
            dialog.set_remote_content(sdp.clone());
        }

        let first_message = content.first_envelope.map(|envelope| {
            let message_id = envelope
                .message_id
                .clone()
                .unwrap_or_else(generate_message_id);
            let sender = if envelope.from.as_str() == rcs_core::ANONYMOUS_URI {
                remote_party.base()
            } else {
                strip_angle_brackets(&envelope.from)
            };
            let mut message = InstantMessage::new(
                &message_id,
                &sender,
                String::from_utf8_lossy(envelope.body()).into_owned(),
            )
            .with_displayed_report_requested(envelope.wants_display());
            message.mime_type = envelope.content_type.clone();
            message
        });

        let contribution_id = invite
            .headers
            .get(CONTRIBUTION_ID_HEADER)
            .map(|value| SmolStr::new(value.as_str()))
            .unwrap_or_else(|| SmolStr::new(call_id.as_str()));
        let subject = invite
            .headers
            .get("Subject")
            .map(|value| SmolStr::new(value.as_str()));

        // Participants announced in the invite's resource list, self excluded
        let local_base = ctx.local_party.base();
        let mut participants: Vec<SipUri> = Vec::new();
        let invite_body = String::from_utf8_lossy(&invite.body).into_owned();
        for uri in parse_resource_list(&invite_body) {
            if uri.base() != local_base && !participants.contains(&uri) {
                participants.push(uri);
            }
        }

        let variant = match variant {
            ChatVariant::GroupTerminating { .. } => ChatVariant::GroupTerminating {
                rejoin: participants.is_empty(),
            },
            other => other,
        };
        if let ChatVariant::GroupTerminating { rejoin: true } = variant {
            tracing::info!(%call_id, "invite to rejoin or restart a group chat");
        }

        let session = Self::build(
            ctx,
            variant,
            dialog,
            contribution_id,
            subject,
            remote_party,
            participants,
            first_message,
            Some(invite.clone()),
        );
        session.learn_remote_capabilities(&collect_feature_tags(&invite.headers));
        Ok(session)
    }

    /// Registers the session and runs its invitation flow as an independent
    /// task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.ctx.registry.insert(Arc::clone(self));
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let result = if session.variant().is_originating() {
                session.run_originating().await
            } else {
                session.run_terminating().await
            };
            if let Err(error) = result {
                session.handle_error(error).await;
            }
        })
    }

    fn build_local_sdp(&self, setup: SetupMode) -> String {
        let port = if setup == SetupMode::Active {
            ACTIVE_SETUP_PORT
        } else {
            self.msrp.local_port()
        };
        build_chat_sdp(&ChatSdpParams {
            ip_address: &self.ctx.local_ip,
            port,
            protocol: self.msrp.local_socket_protocol(),
            accept_types: &self.ctx.settings.accept_types(),
            wrapped_types: &self.ctx.settings.wrapped_types(),
            setup,
            path: &self.msrp.local_path(),
            direction: SDP_DIRECTION_SENDRECV,
        })
    }

    /// Builds the invite content: plain SDP, or multipart when a first
    /// message or file announcement accompanies the session.
    pub(crate) fn build_invite_content(&self, sdp: &str) -> (String, String) {
        match &self.first_message {
            Some(first) => {
                let with_imdn = self.ctx.settings.imdn_activated
                    || mime::is_ft_http(&first.mime_type);
                let message_id = if with_imdn {
                    Some(first.message_id.as_str())
                } else {
                    None
                };
                let cpim = match self.build_invite_envelope(first, message_id) {
                    Some(cpim) => cpim,
                    None => return (mime::APPLICATION_SDP.to_owned(), sdp.to_owned()),
                };
                let body = build_multipart(&[
                    (mime::APPLICATION_SDP, sdp),
                    (mime::MESSAGE_CPIM, &cpim),
                ]);
                (
                    format!("{};boundary={}", mime::MULTIPART_MIXED, rcs_core::BOUNDARY_TAG),
                    body,
                )
            }
            None => (mime::APPLICATION_SDP.to_owned(), sdp.to_owned()),
        }
    }

    fn build_invite_envelope(
        &self,
        first: &InstantMessage,
        message_id: Option<&str>,
    ) -> Option<String> {
        let mut envelope = rcs_core::CpimEnvelope::new(
            &first.mime_type,
            bytes::Bytes::from(first.text.clone().into_bytes()),
        )
        .ok()?;
        if let Some(message_id) = message_id {
            envelope = envelope.with_imdn_message_id(message_id).ok()?;
            let mut tokens = vec![rcs_core::cpim::POSITIVE_DELIVERY];
            if self.ctx.settings.displayed_notification_activated {
                tokens.push(rcs_core::cpim::DISPLAY);
            }
            envelope = envelope.with_disposition(&tokens).ok()?;
        }
        Some(envelope.to_wire())
    }

    async fn run_originating(self: &Arc<Self>) -> Result<(), ChatError> {
        tracing::info!(session = %self.session_id(), kind = self.variant().kind_str(), "initiate session as originating");

        let local_setup = create_setup_offer();
        tracing::debug!(setup = %local_setup, "local setup attribute");
        let sdp = self.build_local_sdp(local_setup);
        let (content_type, content) = self.build_invite_content(&sdp);

        let invite = {
            let mut dialog = self.dialog.lock();
            dialog.set_local_content(content.clone());
            create_invite(
                &dialog,
                &self.feature_tags,
                self.contribution_id(),
                self.subject().map(|s| s.as_str()),
                &content_type,
                &content,
            )
        };

        let response = match self.ctx.signaling.send_request(invite).await {
            Ok(response) => response,
            Err(SignalingError::Timeout) => {
                return Err(ChatError::SessionInitiationFailed {
                    reason: "no response to invite".to_owned(),
                })
            }
            Err(e) => {
                return Err(ChatError::SessionInitiationFailed {
                    reason: e.to_string(),
                })
            }
        };

        match response.code {
            200..=299 => {
                let remote = {
                    let mut dialog = self.dialog.lock();
                    if let Some(to) = response.headers.get("To") {
                        if let Some(tag) = extract_tag(to) {
                            dialog.set_remote_tag(tag);
                        }
                    }
                    let body = String::from_utf8_lossy(&response.body).into_owned();
                    dialog.set_remote_content(body.clone());
                    dialog.signaling_established().map_err(|e| {
                        ChatError::UnexpectedException {
                            reason: e.to_string(),
                        }
                    })?;
                    // The transaction layer acked the 2xx
                    dialog.session_established().map_err(|e| {
                        ChatError::UnexpectedException {
                            reason: e.to_string(),
                        }
                    })?;
                    remote_media_from_sdp(&body)?
                };

                self.learn_remote_capabilities(&collect_feature_tags(&response.headers));

                // Complementary role: if the answerer went active, we serve
                let role = if remote.setup == SetupMode::Active {
                    MsrpRole::Server
                } else {
                    MsrpRole::Client
                };
                self.open_media(role, &remote).await?;
                self.on_session_established();
                Ok(())
            }
            480 | 486 | 603 => Err(ChatError::SessionInitiationDeclined {
                reason: response.reason.to_string(),
            }),
            487 => {
                tracing::info!(session = %self.session_id(), "invite cancelled");
                let mut dialog = self.dialog.lock();
                let _ = dialog.cancelled();
                drop(dialog);
                self.ctx.registry.remove(self.session_id());
                Ok(())
            }
            code => Err(ChatError::SessionInitiationFailed {
                reason: format!("{} {}", code, response.reason),
            }),
        }
    }

    async fn run_terminating(self: &Arc<Self>) -> Result<(), ChatError> {
        tracing::info!(session = %self.session_id(), kind = self.variant().kind_str(), "initiate session as terminating");
        let invite = self
            .invite
            .clone()
            .ok_or_else(|| ChatError::UnexpectedException {
                reason: "terminating session without invite".to_owned(),
            })?;

        let carries_file_info = self
            .first_message()
            .map(|m| mime::is_ft_http(&m.mime_type))
            .unwrap_or(false);
        let auto_accept = carries_file_info
            || self.variant().is_store_forward()
            || if self.variant().is_group() {
                self.ctx.settings.group_chat_auto_accept
            } else {
                self.ctx.settings.chat_auto_accept
            };

        if auto_accept {
            tracing::debug!("auto accept invitation");
        } else {
            tracing::debug!("manual accept; ringing");
            let ringing = {
                let dialog = self.dialog.lock();
                create_response(&invite, &dialog, 180, "Ringing", &[], None, "")
            };
            self.ctx
                .signaling
                .send_response(ringing)
                .await
                .map_err(|e| ChatError::SessionInitiationFailed {
                    reason: e.to_string(),
                })?;

            match self.wait_invitation_answer().await {
                Some(InvitationAnswer::Accepted) => {}
                Some(InvitationAnswer::Rejected) => {
                    tracing::debug!("session rejected by user");
                    let decline = {
                        let dialog = self.dialog.lock();
                        create_response(&invite, &dialog, 603, "Decline", &[], None, "")
                    };
                    let _ = self.ctx.signaling.send_response(decline).await;
                    self.finish_unanswered(TerminationReason::ByUser).await;
                    return Ok(());
                }
                Some(InvitationAnswer::Cancelled) => {
                    tracing::debug!("session cancelled by peer");
                    {
                        let mut dialog = self.dialog.lock();
                        let _ = dialog.cancelled();
                    }
                    // No response goes back; still release any media resources
                    self.close_media_session().await;
                    self.ctx.registry.remove(self.session_id());
                    return Ok(());
                }
                None => {
                    tracing::debug!("session not answered within ringing period");
                    let busy = {
                        let dialog = self.dialog.lock();
                        create_response(&invite, &dialog, 486, "Busy Here", &[], None, "")
                    };
                    let _ = self.ctx.signaling.send_response(busy).await;
                    self.finish_unanswered(TerminationReason::ByTimeout).await;
                    return Ok(());
                }
            }
        }

        let offer = self.dialog.lock().remote_content.clone();
        let remote = match offer.as_deref().map(remote_media_from_sdp) {
            Some(Ok(remote)) => remote,
            other => {
                // No usable media offer: answer 415 and give up
                let unsupported = {
                    let dialog = self.dialog.lock();
                    create_response(&invite, &dialog, 415, "Unsupported Media Type", &[], None, "")
                };
                let _ = self.ctx.signaling.send_response(unsupported).await;
                return Err(match other {
                    Some(Err(error)) => error,
                    _ => ChatError::UnsupportedMediaType {
                        reason: "invite without sdp offer".to_owned(),
                    },
                });
            }
        };
        tracing::debug!(remote_setup = %remote.setup, "remote setup attribute");

        let local_setup = create_setup_answer(remote.setup);
        tracing::debug!(setup = %local_setup, "local setup attribute");
        let sdp = self.build_local_sdp(local_setup);
        self.dialog.lock().set_local_content(sdp.clone());

        if self.is_interrupted() {
            tracing::debug!("session interrupted before answer; end of processing");
            return Ok(());
        }

        // Passive endpoint serves before answering so the active peer can
        // connect as soon as it sees the 200; the empty chunk opens the NAT
        // path even on the passive side.
        if local_setup == SetupMode::Passive {
            self.open_media(MsrpRole::Server, &remote).await?;
        }

        let ok = {
            let dialog = self.dialog.lock();
            create_response(
                &invite,
                &dialog,
                200,
                "OK",
                &self.feature_tags,
                Some(mime::APPLICATION_SDP),
                &sdp,
            )
        };
        self.ctx
            .signaling
            .send_response(ok)
            .await
            .map_err(|e| ChatError::SessionInitiationFailed {
                reason: e.to_string(),
            })?;
        self.dialog
            .lock()
            .signaling_established()
            .map_err(|e| ChatError::UnexpectedException {
                reason: e.to_string(),
            })?;

        let ack_timeout = self.ctx.settings.ack_timeout;
        match self
            .ctx
            .signaling
            .wait_ack(self.session_id(), ack_timeout)
            .await
        {
            Ok(()) => {
                tracing::info!("ack received");
            }
            Err(_) => {
                // A missed ACK is a hard initiation failure, not retried
                return Err(ChatError::SessionInitiationFailed {
                    reason: "no ack received for invite response".to_owned(),
                });
            }
        }
        self.dialog
            .lock()
            .session_established()
            .map_err(|e| ChatError::UnexpectedException {
                reason: e.to_string(),
            })?;

        if local_setup == SetupMode::Active {
            self.open_media(MsrpRole::Client, &remote).await?;
        }

        self.on_session_established();
        self.deliver_first_message().await;

        if let ChatVariant::GroupTerminating { .. } = self.variant() {
            self.spawn_missing_participant_sweep();
        }
        Ok(())
    }

    async fn finish_unanswered(self: &Arc<Self>, reason: TerminationReason) {
        {
            let mut dialog = self.dialog.lock();
            let _ = dialog.terminated();
        }
        self.ctx.registry.remove(self.session_id());
        self.emit(ChatEvent::SessionAborted { reason });
    }

    pub(crate) async fn open_media(
        self: &Arc<Self>,
        role: MsrpRole,
        remote: &RemoteMedia,
    ) -> Result<(), ChatError> {
        let events = self.media_events_tx();
        let transport = match role {
            MsrpRole::Client => self.ctx.msrp_factory.create_client(
                &remote.host,
                remote.port,
                &remote.path,
                events,
            ),
            MsrpRole::Server => self
                .ctx
                .msrp_factory
                .create_server(&self.msrp.local_path(), events),
        };
        self.msrp
            .install(transport)
            .map_err(|e| ChatError::MediaSessionFailed {
                reason: e.to_string(),
            })?;
        self.msrp
            .open_session()
            .await
            .map_err(|e| ChatError::MediaSessionFailed {
                reason: e.to_string(),
            })?;
        self.send_empty_chunk().await;
        Ok(())
    }

    fn on_session_established(self: &Arc<Self>) {
        self.spawn_media_loop();
        self.spawn_activity_watcher();
        self.activity.update();
        self.emit(ChatEvent::SessionStarted);
    }

    /// Routes the invite's first payload through the normal inbound paths
    /// once the session is up.
    async fn deliver_first_message(self: &Arc<Self>) {
        let Some(first) = self.first_message.clone() else {
            return;
        };
        if mime::is_ft_http(&first.mime_type) {
            // The announcement always elicits a delivered report
            self.send_delivery_report(&first.message_id, rcs_core::DeliveryStatus::Delivered)
                .await;
            self.receive_http_file_transfer(&first.remote, &first.message_id, first.text.as_bytes());
        } else {
            if first.displayed_report_requested
                && self.ctx.settings.displayed_notification_activated
            {
                self.ctx
                    .store
                    .set_displayed_report_pending(&first.message_id);
            }
            if self
                .ctx
                .store
                .mark_seen(self.contribution_id(), &first.message_id)
            {
                self.ctx.store.insert_message(self.contribution_id(), &first);
                self.emit(ChatEvent::MessageReceived(first));
            }
        }
    }

}
