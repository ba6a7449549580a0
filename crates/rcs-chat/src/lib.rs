// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chat session engine.
//!
//! Composes the dialog path, MSRP media plane, delivery tracker and
//! capability negotiation into runnable conversations:
//!
//! - **One-to-one** sessions, originating and terminating, optionally
//!   carrying the first message (or a file-transfer-over-HTTP announcement)
//!   inside the invite.
//! - **Ad-hoc group** sessions with REFER-based participant addition.
//! - **Store-and-forward** sessions delivering messages and notifications
//!   missed while offline.
//!
//! Sessions run as independent tasks, publish [`ChatEvent`]s to
//! subscribers, and reach their collaborators (message store, contact
//! block-list, signaling transactions, MSRP transport) through traits.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use rcs_chat::{ChatContext, ChatSession};
//! use rcs_core::SipUri;
//!
//! # fn context() -> ChatContext { unimplemented!() }
//! let ctx: ChatContext = context();
//! let remote = SipUri::parse("sip:bob@example.com").unwrap();
//! let session = ChatSession::originating_one2one(ctx, remote, Some("hello"));
//! let mut events = session.subscribe();
//! session.start();
//! ```

pub mod activity;
pub mod composing;
pub mod delivery;
pub mod error;
pub mod events;
mod group;
mod invite;
pub mod registry;
pub mod session;
pub mod settings;
pub mod standfw;
pub mod store;
pub mod transaction;

pub use delivery::DeliveryTracker;
pub use error::{ChatError, SignalingError};
pub use events::{ChatEvent, EventBus, TerminationReason};
pub use registry::SessionRegistry;
pub use session::{ChatContext, ChatSession, ChatVariant, InvitationAnswer};
pub use settings::RcsSettings;
pub use standfw::StoreAndForwardManager;
pub use store::{ContactManager, InMemoryMessageStore, MessageStore, PermissiveContactManager};
pub use transaction::SignalingTransport;
