// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core RCS protocol types and documents.
//!
//! This crate provides the foundational types for the Siphon RCS engine:
//! - **Signaling**: [`Request`], [`Response`], [`Method`], [`Headers`]
//! - **URIs**: [`SipUri`]
//! - **Documents**: CPIM envelope ([`CpimEnvelope`]), IMDN delivery reports
//!   ([`ImdnDocument`]), isComposing state, geolocation push, and the
//!   file-transfer-over-HTTP info document ([`FileTransferHttpInfo`])
//! - **Capabilities**: feature-tag construction and extraction
//!   ([`build_supported_tags`], [`extract_capabilities`])
//! - **Bodies**: multipart invite bodies mixing SDP and CPIM parts
//!
//! All types use [`SmolStr`](smol_str::SmolStr) and [`Bytes`](bytes::Bytes)
//! for efficient string and binary data handling.

pub mod capabilities;
pub mod cpim;
pub mod ftinfo;
pub mod geoloc;
pub mod imdn;
pub mod iscomposing;
pub mod message;
pub mod mime;
pub mod multipart;
pub mod signaling;
pub mod uri;
mod xml;

pub use capabilities::{
    build_capability_sdp, build_supported_tags, extract_capabilities, Capabilities, MediaCatalog,
    NetworkAccess,
};
pub use cpim::{parse_cpim, CpimEnvelope, CpimError, ANONYMOUS_URI};
pub use ftinfo::{parse_file_info, FileTransferHttpInfo, FileTransferHttpThumbnail, FtInfoError};
pub use geoloc::{parse_geoloc_document, GeolocError, GeolocPush};
pub use imdn::{parse_imdn, DeliveryStatus, ImdnDocument, ImdnError};
pub use iscomposing::{build_is_composing, parse_is_composing, IsComposingError, IsComposingInfo};
pub use message::{GeolocMessage, InstantMessage};
pub use multipart::{parse_multipart, MultipartError, MultipartPart, BOUNDARY_TAG};
pub use signaling::{
    collect_feature_tags, extract_tag, generate_branch, generate_call_id, generate_message_id,
    generate_tag, header_value, Header, Headers, Method, Request, Response,
};
pub use uri::SipUri;
