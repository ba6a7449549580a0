// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capability discovery via protocol feature tags.
//!
//! Capabilities travel as feature tags on signaling headers. Most RCS
//! services are bundled into one composite IARI tag whose value is a
//! comma-joined list of service identifiers; a few are advertised as
//! individual tags. An SDP body, when present, can revoke media capabilities
//! the tag exchange asserted (no shared codec, no shared format).
//!
//! Capability sets are derived fresh per negotiation and never patched in
//! place: extraction always builds a new [`Capabilities`] value.

use smol_str::SmolStr;

use rcs_sdp::{parse_sdp, rtpmap_codec};

/// Feature tag constants.
pub mod tags {
    /// Composite RCS-E tag carrying the comma-joined service list.
    pub const RCSE: &str = "+g.3gpp.iari-ref";
    /// Video share (tied to a circuit-switched call).
    pub const VIDEO_SHARE: &str = "+g.3gpp.cs-voice";
    /// IP voice call, RCS namespace.
    pub const IP_VOICE_CALL_RCSE: &str = "+g.gsma.rcs.ipcall";
    /// IP voice call, 3GPP namespace. Both namespaces are required before
    /// the capability is asserted.
    pub const IP_VOICE_CALL_3GPP: &str =
        "+g.3gpp.icsi-ref=\"urn%3Aurn-7%3A3gpp-service.ims.icsi.mmtel\"";
    /// IP video call.
    pub const IP_VIDEO_CALL: &str = "+g.gsma.rcs.ipvideocall";
    /// Automaton endpoint (RFC 3840).
    pub const SIP_AUTOMATA: &str = "+sip.automata";

    /// Service identifiers bundled inside the composite tag.
    pub const CHAT: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.im";
    pub const FT: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ft";
    pub const FT_HTTP: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.fthttp";
    pub const IMAGE_SHARE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.gsma-is";
    pub const PRESENCE_DISCOVERY: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.dp";
    pub const SOCIAL_PRESENCE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.sp";
    pub const GEOLOCATION_PUSH: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.geopush";
    pub const FT_THUMBNAIL: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ftthumb";
    pub const FT_STORE_FORWARD: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ftstandfw";
    pub const GC_STORE_FORWARD: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.gcstandfw";
    /// Prefix identifying extension service identifiers.
    pub const EXTENSION_PREFIX: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ext";
}

/// Network access class, ordered by capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkAccess {
    Gprs,
    Edge,
    ThreeG,
    Lte,
    Wifi,
}

/// Locally supported media, used to intersect remote SDP offers.
#[derive(Debug, Clone, Default)]
pub struct MediaCatalog {
    /// Lowercased video codec names
    pub video_codecs: Vec<SmolStr>,
    /// Transferable MIME formats
    pub transfer_formats: Vec<SmolStr>,
}

impl MediaCatalog {
    pub fn is_codec_supported(&self, codec: &str) -> bool {
        self.video_codecs
            .iter()
            .any(|c| c.eq_ignore_ascii_case(codec))
    }

    pub fn is_format_supported(&self, format: &str) -> bool {
        self.transfer_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }
}

/// Per-service capability flags plus opaque extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub video_share: bool,
    pub image_share: bool,
    pub im_session: bool,
    pub file_transfer: bool,
    pub file_transfer_http: bool,
    pub presence_discovery: bool,
    pub social_presence: bool,
    pub geolocation_push: bool,
    pub ft_thumbnail: bool,
    pub ft_store_forward: bool,
    pub gc_store_forward: bool,
    pub ip_voice_call: bool,
    pub ip_video_call: bool,
    pub sip_automata: bool,
    pub extensions: Vec<SmolStr>,
}

/// Builds the ordered feature tag list advertising the given capabilities.
///
/// Tags needing richer-than-minimum network access (video share) are
/// included only when the access class qualifies. Bundled services are
/// joined into one composite tag value.
pub fn build_supported_tags(caps: &Capabilities, network: NetworkAccess) -> Vec<SmolStr> {
    let mut out = Vec::new();

    if caps.video_share && network >= NetworkAccess::ThreeG {
        out.push(SmolStr::new(tags::VIDEO_SHARE));
    }

    let mut bundled: Vec<&str> = Vec::new();
    if caps.im_session {
        bundled.push(tags::CHAT);
    }
    if caps.file_transfer {
        bundled.push(tags::FT);
    }
    if caps.file_transfer_http {
        bundled.push(tags::FT_HTTP);
    }
    if caps.image_share {
        bundled.push(tags::IMAGE_SHARE);
    }
    if caps.presence_discovery {
        bundled.push(tags::PRESENCE_DISCOVERY);
    }
    if caps.social_presence {
        bundled.push(tags::SOCIAL_PRESENCE);
    }
    if caps.geolocation_push {
        bundled.push(tags::GEOLOCATION_PUSH);
    }
    if caps.ft_thumbnail {
        bundled.push(tags::FT_THUMBNAIL);
    }
    if caps.ft_store_forward {
        bundled.push(tags::FT_STORE_FORWARD);
    }
    if caps.gc_store_forward {
        bundled.push(tags::GC_STORE_FORWARD);
    }
    let extensions: Vec<&str> = caps.extensions.iter().map(|e| e.as_str()).collect();
    bundled.extend(extensions);

    if caps.ip_voice_call {
        out.push(SmolStr::new(tags::IP_VOICE_CALL_RCSE));
        out.push(SmolStr::new(tags::IP_VOICE_CALL_3GPP));
    }
    if caps.ip_video_call {
        out.push(SmolStr::new(tags::IP_VIDEO_CALL));
    }
    if caps.sip_automata {
        out.push(SmolStr::new(tags::SIP_AUTOMATA));
    }

    if !bundled.is_empty() {
        out.push(SmolStr::new(format!(
            "{}=\"{}\"",
            tags::RCSE,
            bundled.join(",")
        )));
    }

    out
}

/// Extracts remote capabilities from a feature tag list and optional SDP.
///
/// Tags are recognized by substring match. IP voice call requires both
/// namespaced tags to have been observed across the whole list, in either
/// order. When an SDP body is present, video share is revoked unless at
/// least one advertised codec is in the local registry, and image share is
/// revoked unless at least one advertised format is supported.
pub fn extract_capabilities(
    tag_list: &[SmolStr],
    sdp: Option<&[u8]>,
    catalog: &MediaCatalog,
) -> Capabilities {
    let mut caps = Capabilities::default();
    let mut ipcall_rcse = false;
    let mut ipcall_3gpp = false;

    for tag in tag_list {
        let tag = tag.as_str();
        if tag.contains(tags::VIDEO_SHARE) {
            caps.video_share = true;
        }
        if tag.contains(tags::IMAGE_SHARE) {
            caps.image_share = true;
        }
        if tag.contains(tags::CHAT) {
            caps.im_session = true;
        }
        if tag.contains(tags::FT_HTTP) {
            caps.file_transfer_http = true;
        }
        if tag.contains(tags::FT_THUMBNAIL) {
            caps.ft_thumbnail = true;
        }
        if tag.contains(tags::FT_STORE_FORWARD) {
            caps.ft_store_forward = true;
        }
        if tag.contains(tags::GC_STORE_FORWARD) {
            caps.gc_store_forward = true;
        }
        // Bare "ft" must not fire on fthttp/ftthumb/ftstandfw, so match the
        // identifier with its terminating quote/comma or end of value.
        if contains_service(tag, tags::FT) {
            caps.file_transfer = true;
        }
        if tag.contains(tags::PRESENCE_DISCOVERY) {
            caps.presence_discovery = true;
        }
        if tag.contains(tags::SOCIAL_PRESENCE) {
            caps.social_presence = true;
        }
        if tag.contains(tags::GEOLOCATION_PUSH) {
            caps.geolocation_push = true;
        }
        if tag.contains(tags::IP_VOICE_CALL_RCSE) {
            ipcall_rcse = true;
        }
        if tag.contains(tags::IP_VOICE_CALL_3GPP) {
            ipcall_3gpp = true;
        }
        if tag.contains(tags::IP_VIDEO_CALL) {
            caps.ip_video_call = true;
        }
        if tag.contains(tags::SIP_AUTOMATA) {
            caps.sip_automata = true;
        }
        if tag.contains(tags::EXTENSION_PREFIX) {
            for ext in extract_extensions(tag) {
                if !caps.extensions.contains(&ext) {
                    caps.extensions.push(ext);
                }
            }
        }
    }

    // Both namespaces observed, in either order
    caps.ip_voice_call = ipcall_rcse && ipcall_3gpp;

    if let Some(sdp_bytes) = sdp {
        apply_sdp_intersection(&mut caps, sdp_bytes, catalog);
    }

    caps
}

fn apply_sdp_intersection(caps: &mut Capabilities, sdp: &[u8], catalog: &MediaCatalog) {
    let text = String::from_utf8_lossy(sdp);
    let session = match parse_sdp(&text) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed capability sdp");
            return;
        }
    };

    let mut shared_codec = false;
    let mut saw_video = false;
    for media in session.all_media_of_kind("video") {
        saw_video = true;
        for rtpmap in media.attributes_named("rtpmap") {
            if let Some(codec) = rtpmap_codec(rtpmap) {
                if catalog.is_codec_supported(&codec) {
                    shared_codec = true;
                }
            }
        }
    }
    if caps.video_share && saw_video && !shared_codec {
        caps.video_share = false;
    }
    if caps.video_share && !saw_video {
        // SDP present but no video section offered
        caps.video_share = false;
    }

    let mut shared_format = false;
    let mut saw_message = false;
    for media in session.all_media_of_kind("message") {
        saw_message = true;
        if let Some(accept_types) = media.attribute("accept-types") {
            for format in accept_types.split_whitespace() {
                if catalog.is_format_supported(format) {
                    shared_format = true;
                }
            }
        }
    }
    if caps.image_share && (!saw_message || !shared_format) {
        caps.image_share = false;
    }
}

/// Builds the capability-exchange SDP body, gated by local capabilities and
/// network class.
///
/// Video codecs are offered only when video share is enabled and the access
/// class is rich enough; transfer formats are offered when image share or
/// geolocation push is enabled. Returns `None` when nothing is offerable.
pub fn build_capability_sdp(
    caps: &Capabilities,
    network: NetworkAccess,
    ip_address: &str,
    video_codecs: &[rcs_sdp::VideoCodecDesc],
    catalog: &MediaCatalog,
    max_size: u64,
) -> Option<String> {
    let codecs: &[rcs_sdp::VideoCodecDesc] =
        if caps.video_share && network >= NetworkAccess::ThreeG {
            video_codecs
        } else {
            &[]
        };
    let formats: &[SmolStr] = if caps.image_share || caps.geolocation_push {
        &catalog.transfer_formats
    } else {
        &[]
    };
    rcs_sdp::build_capability_sdp(ip_address, codecs, formats, max_size)
}

fn contains_service(tag: &str, service: &str) -> bool {
    let mut search = 0;
    while let Some(rel) = tag[search..].find(service) {
        let pos = search + rel;
        let end = pos + service.len();
        let terminated = tag[end..]
            .chars()
            .next()
            .map(|c| c == ',' || c == '"' || c == ';')
            .unwrap_or(true);
        if terminated {
            return true;
        }
        search = end;
    }
    false
}

fn extract_extensions(tag: &str) -> Vec<SmolStr> {
    let value = match tag.split_once('=') {
        Some((_, value)) => value.trim_matches('"'),
        None => tag,
    };
    value
        .split(',')
        .filter(|id| id.starts_with(tags::EXTENSION_PREFIX))
        .map(SmolStr::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_flags() -> Capabilities {
        Capabilities {
            video_share: true,
            image_share: true,
            im_session: true,
            file_transfer: true,
            file_transfer_http: true,
            presence_discovery: true,
            social_presence: true,
            geolocation_push: true,
            ft_thumbnail: true,
            ft_store_forward: true,
            gc_store_forward: true,
            ip_voice_call: true,
            ip_video_call: true,
            sip_automata: true,
            extensions: vec![SmolStr::new(format!("{}.demo", tags::EXTENSION_PREFIX))],
        }
    }

    fn catalog() -> MediaCatalog {
        MediaCatalog {
            video_codecs: vec![SmolStr::new("h264")],
            transfer_formats: vec![SmolStr::new("image/jpeg")],
        }
    }

    #[test]
    fn round_trip_without_sdp() {
        let flags = full_flags();
        let tags = build_supported_tags(&flags, NetworkAccess::Wifi);
        let extracted = extract_capabilities(&tags, None, &catalog());
        // Without SDP no flag is revoked, so the round trip is exact.
        assert_eq!(extracted, flags);
    }

    #[test]
    fn video_share_gated_by_network_class() {
        let flags = full_flags();
        let tag_list = build_supported_tags(&flags, NetworkAccess::Edge);
        assert!(!tag_list.iter().any(|t| t.contains(tags::VIDEO_SHARE)));

        let tag_list = build_supported_tags(&flags, NetworkAccess::ThreeG);
        assert!(tag_list.iter().any(|t| t.contains(tags::VIDEO_SHARE)));
    }

    #[test]
    fn bundled_services_share_one_composite_tag() {
        let flags = Capabilities {
            im_session: true,
            file_transfer: true,
            file_transfer_http: true,
            ..Capabilities::default()
        };
        let tag_list = build_supported_tags(&flags, NetworkAccess::Wifi);
        assert_eq!(tag_list.len(), 1);
        let composite = tag_list[0].as_str();
        assert!(composite.starts_with(tags::RCSE));
        assert!(composite.contains(tags::CHAT));
        assert!(composite.contains(tags::FT_HTTP));
    }

    #[test]
    fn ip_voice_call_requires_both_namespaces() {
        let only_rcse = vec![SmolStr::new(tags::IP_VOICE_CALL_RCSE)];
        assert!(!extract_capabilities(&only_rcse, None, &catalog()).ip_voice_call);

        let only_3gpp = vec![SmolStr::new(tags::IP_VOICE_CALL_3GPP)];
        assert!(!extract_capabilities(&only_3gpp, None, &catalog()).ip_voice_call);

        let both = vec![
            SmolStr::new(tags::IP_VOICE_CALL_RCSE),
            SmolStr::new(tags::IP_VOICE_CALL_3GPP),
        ];
        assert!(extract_capabilities(&both, None, &catalog()).ip_voice_call);

        let reversed = vec![
            SmolStr::new(tags::IP_VOICE_CALL_3GPP),
            SmolStr::new(tags::IP_VOICE_CALL_RCSE),
        ];
        assert!(extract_capabilities(&reversed, None, &catalog()).ip_voice_call);
    }

    #[test]
    fn bare_ft_does_not_fire_on_fthttp() {
        let tag_list = vec![SmolStr::new(format!(
            "{}=\"{}\"",
            tags::RCSE,
            tags::FT_HTTP
        ))];
        let caps = extract_capabilities(&tag_list, None, &catalog());
        assert!(caps.file_transfer_http);
        assert!(!caps.file_transfer);
    }

    #[test]
    fn sdp_revokes_video_share_without_shared_codec() {
        let tag_list = vec![SmolStr::new(tags::VIDEO_SHARE)];
        let sdp = "v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 vp8/90000\r\n";
        let caps = extract_capabilities(&tag_list, Some(sdp.as_bytes()), &catalog());
        assert!(!caps.video_share);

        let sdp_ok = "v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n";
        let caps = extract_capabilities(&tag_list, Some(sdp_ok.as_bytes()), &catalog());
        assert!(caps.video_share);
    }

    #[test]
    fn sdp_revokes_image_share_without_shared_format() {
        let tag_list = vec![SmolStr::new(format!(
            "{}=\"{}\"",
            tags::RCSE,
            tags::IMAGE_SHARE
        ))];
        let sdp = "v=0\r\nm=message 0 TCP/MSRP *\r\na=accept-types:image/tiff\r\n";
        let caps = extract_capabilities(&tag_list, Some(sdp.as_bytes()), &catalog());
        assert!(!caps.image_share);

        let sdp_ok = "v=0\r\nm=message 0 TCP/MSRP *\r\na=accept-types:image/jpeg image/png\r\n";
        let caps = extract_capabilities(&tag_list, Some(sdp_ok.as_bytes()), &catalog());
        assert!(caps.image_share);
    }

    #[test]
    fn capability_sdp_gated_by_network_and_flags() {
        let codecs = vec![rcs_sdp::VideoCodecDesc {
            payload: 96,
            codec: SmolStr::new("h264"),
            clock_rate: Some(90000),
            framesize: None,
            framerate: None,
            fmtp: None,
        }];
        let catalog = catalog();

        let flags = Capabilities {
            video_share: true,
            image_share: true,
            ..Capabilities::default()
        };
        let sdp =
            build_capability_sdp(&flags, NetworkAccess::Wifi, "10.0.0.1", &codecs, &catalog, 0)
                .unwrap();
        assert!(sdp.contains("m=video"));
        assert!(sdp.contains("m=message"));

        // Poor network access drops the video offer
        let sdp =
            build_capability_sdp(&flags, NetworkAccess::Edge, "10.0.0.1", &codecs, &catalog, 0)
                .unwrap();
        assert!(!sdp.contains("m=video"));

        // Nothing offerable: no body at all
        let none = Capabilities::default();
        assert!(build_capability_sdp(
            &none,
            NetworkAccess::Wifi,
            "10.0.0.1",
            &codecs,
            &catalog,
            0
        )
        .is_none());
    }

    #[test]
    fn extensions_captured_verbatim() {
        let ext = format!("{}.game", tags::EXTENSION_PREFIX);
        let tag_list = vec![SmolStr::new(format!("{}=\"{}\"", tags::RCSE, ext))];
        let caps = extract_capabilities(&tag_list, None, &catalog());
        assert_eq!(caps.extensions, vec![SmolStr::new(ext)]);
    }
}
