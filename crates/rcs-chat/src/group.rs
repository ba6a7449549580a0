// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Group session participant management.
//!
//! Participants join an established group session via REFER toward the
//! conference focus. The REFER either reuses the session's dialog
//! (serializing its sequence-counter increments) or forks a fresh one; a
//! proxy-authentication challenge is answered exactly once.

use std::sync::Arc;
use std::time::Duration;

use smol_str::SmolStr;

use rcs_core::SipUri;

use crate::events::ChatEvent;
use crate::session::{ChatSession, ChatVariant};
use crate::transaction::{create_refer, SessionAuthenticationAgent};

/// Delay before the post-establishment sweep checks for missing members.
const SWEEP_DELAY: Duration = Duration::from_secs(2);

impl ChatSession {
    /// Adds a single participant to the group session.
    pub async fn add_participant(self: &Arc<Self>, participant: SipUri) {
        self.add_participants(vec![participant]).await;
    }

    /// Adds participants to the group session via REFER.
    ///
    /// The outcome is reported through the event bus as
    /// [`ChatEvent::ParticipantAddSucceeded`] or
    /// [`ChatEvent::ParticipantAddFailed`].
    pub async fn add_participants(self: &Arc<Self>, participants: Vec<SipUri>) {
        if !self.variant().is_group() {
            self.emit(ChatEvent::ParticipantAddFailed {
                reason: "not a group session".to_owned(),
            });
            return;
        }
        if participants.is_empty() {
            return;
        }
        let max = self.ctx.settings.max_chat_participants;
        if max > 0 && self.participants().len() + participants.len() + 1 > max {
            self.emit(ChatEvent::ParticipantAddFailed {
                reason: "max number of participants reached".to_owned(),
            });
            return;
        }
        tracing::debug!(
            session = %self.session_id(),
            count = participants.len(),
            "add participants to the session"
        );

        // Either share the invite dialog (serialized cseq) or fork a fresh
        // out-of-dialog path.
        let refer = if self.ctx.settings.refer_uses_dialog {
            let mut dialog = self.dialog.lock();
            dialog.increment_cseq();
            create_refer(&dialog, &participants)
        } else {
            let fork = self.dialog.lock().fork();
            create_refer(&fork, &participants)
        };

        let response = match self.ctx.signaling.send_request(refer).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "refer request failed");
                self.emit(ChatEvent::ParticipantAddFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let final_response = if response.code == 407 {
            // Answer the proxy challenge exactly once
            let (Some(user), Some(password)) = (
                self.ctx.settings.auth_user.clone(),
                self.ctx.settings.auth_password.clone(),
            ) else {
                self.emit(ChatEvent::ParticipantAddFailed {
                    reason: "proxy authentication required".to_owned(),
                });
                return;
            };
            let mut agent = SessionAuthenticationAgent::new(&user, &password);
            agent.read_proxy_authenticate(&response);

            let mut retry = if self.ctx.settings.refer_uses_dialog {
                let mut dialog = self.dialog.lock();
                dialog.increment_cseq();
                create_refer(&dialog, &participants)
            } else {
                let fork = self.dialog.lock().fork();
                create_refer(&fork, &participants)
            };
            agent.set_proxy_authorization(&mut retry);

            match self.ctx.signaling.send_request(retry).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "second refer request failed");
                    self.emit(ChatEvent::ParticipantAddFailed {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        } else {
            response
        };

        if final_response.is_success() {
            tracing::debug!(code = final_response.code, "refer accepted");
            let mut list = self.participants.lock();
            for participant in participants {
                if !list.contains(&participant) {
                    list.push(participant);
                }
            }
            drop(list);
            self.emit(ChatEvent::ParticipantAddSucceeded);
        } else {
            tracing::debug!(code = final_response.code, "refer failed");
            self.emit(ChatEvent::ParticipantAddFailed {
                reason: final_response.reason.to_string(),
            });
        }
    }

    /// Re-invites members recorded as connected to the conversation but
    /// absent from the invite's participant list. Runs once, shortly after
    /// establishment, and dies with the session.
    pub(crate) fn spawn_missing_participant_sweep(self: &Arc<Self>) {
        debug_assert!(matches!(
            self.variant(),
            ChatVariant::GroupTerminating { .. }
        ));
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_DELAY) => {}
                _ = session.shutdown.notified() => return,
            }

            let invited: Vec<SmolStr> = session
                .participants()
                .iter()
                .map(|uri| SmolStr::new(uri.base()))
                .collect();
            let connected = session
                .ctx
                .store
                .group_connected_participants(session.contribution_id());

            let missing: Vec<SipUri> = connected
                .iter()
                .filter(|member| !invited.contains(member))
                .filter_map(|member| SipUri::parse(member))
                .collect();
            if missing.is_empty() {
                return;
            }
            tracing::debug!(
                count = missing.len(),
                "re-inviting missing participants to the conference"
            );
            session.add_participants(missing).await;
        });
    }
}
