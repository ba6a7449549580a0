// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SDP serialization for chat sessions and capability exchange.

use smol_str::SmolStr;

use crate::negotiate::SetupMode;

const CRLF: &str = "\r\n";

/// Inputs for a chat media offer or answer.
#[derive(Debug, Clone)]
pub struct ChatSdpParams<'a> {
    pub ip_address: &'a str,
    pub port: u16,
    /// "TCP/MSRP" or "TCP/TLS/MSRP"
    pub protocol: &'a str,
    /// Space-separated MIME types accepted on the wire
    pub accept_types: &'a str,
    /// Space-separated MIME types accepted inside the CPIM envelope
    pub wrapped_types: &'a str,
    pub setup: SetupMode,
    /// Local MSRP path URI
    pub path: &'a str,
    /// "sendrecv", "sendonly" or "recvonly"
    pub direction: &'a str,
}

/// Builds the `m=message` SDP body for a chat session.
pub fn build_chat_sdp(params: &ChatSdpParams<'_>) -> String {
    let mut sdp = String::with_capacity(256);
    sdp.push_str("v=0");
    sdp.push_str(CRLF);
    sdp.push_str(&format!(
        "o=- 3600 3600 IN IP4 {}",
        params.ip_address
    ));
    sdp.push_str(CRLF);
    sdp.push_str("s=-");
    sdp.push_str(CRLF);
    sdp.push_str(&format!("c=IN IP4 {}", params.ip_address));
    sdp.push_str(CRLF);
    sdp.push_str("t=0 0");
    sdp.push_str(CRLF);
    sdp.push_str(&format!("m=message {} {} *", params.port, params.protocol));
    sdp.push_str(CRLF);
    if !params.accept_types.is_empty() {
        sdp.push_str(&format!("a=accept-types:{}", params.accept_types));
        sdp.push_str(CRLF);
    }
    if !params.wrapped_types.is_empty() {
        sdp.push_str(&format!(
            "a=accept-wrapped-types:{}",
            params.wrapped_types
        ));
        sdp.push_str(CRLF);
    }
    sdp.push_str(&format!("a=setup:{}", params.setup));
    sdp.push_str(CRLF);
    sdp.push_str(&format!("a=path:{}", params.path));
    sdp.push_str(CRLF);
    sdp.push_str(&format!("a={}", params.direction));
    sdp.push_str(CRLF);
    sdp
}

/// A video codec advertised in capability SDP.
#[derive(Debug, Clone)]
pub struct VideoCodecDesc {
    pub payload: u8,
    pub codec: SmolStr,
    pub clock_rate: Option<u32>,
    /// `a=framesize` value, e.g. "96 176-144"
    pub framesize: Option<SmolStr>,
    /// `a=framerate` value
    pub framerate: Option<SmolStr>,
    /// `a=fmtp` value
    pub fmtp: Option<SmolStr>,
}

/// Builds the capability-exchange SDP body.
///
/// Emits an `m=video` section per advertised codec and an `m=message`
/// section listing the transferable MIME formats. Returns `None` when
/// neither is offerable, in which case the OPTIONS exchange carries no body.
pub fn build_capability_sdp(
    ip_address: &str,
    video_codecs: &[VideoCodecDesc],
    transfer_formats: &[SmolStr],
    max_size: u64,
) -> Option<String> {
    if video_codecs.is_empty() && transfer_formats.is_empty() {
        return None;
    }

    let mut sdp = String::with_capacity(256);
    sdp.push_str("v=0");
    sdp.push_str(CRLF);
    sdp.push_str(&format!("o=- 3600 3600 IN IP4 {}", ip_address));
    sdp.push_str(CRLF);
    sdp.push_str("s=-");
    sdp.push_str(CRLF);
    sdp.push_str(&format!("c=IN IP4 {}", ip_address));
    sdp.push_str(CRLF);
    sdp.push_str("t=0 0");
    sdp.push_str(CRLF);

    for codec in video_codecs {
        sdp.push_str(&format!("m=video 0 RTP/AVP {}", codec.payload));
        sdp.push_str(CRLF);
        match codec.clock_rate {
            Some(rate) => {
                sdp.push_str(&format!("a=rtpmap:{} {}/{}", codec.payload, codec.codec, rate))
            }
            None => sdp.push_str(&format!("a=rtpmap:{} {}", codec.payload, codec.codec)),
        }
        sdp.push_str(CRLF);
        if let Some(framesize) = &codec.framesize {
            sdp.push_str(&format!("a=framesize:{}", framesize));
            sdp.push_str(CRLF);
        }
        if let Some(framerate) = &codec.framerate {
            sdp.push_str(&format!("a=framerate:{}", framerate));
            sdp.push_str(CRLF);
        }
        if let Some(fmtp) = &codec.fmtp {
            sdp.push_str(&format!("a=fmtp:{}", fmtp));
            sdp.push_str(CRLF);
        }
    }

    if !transfer_formats.is_empty() {
        sdp.push_str("m=message 0 TCP/MSRP *");
        sdp.push_str(CRLF);
        let formats: Vec<&str> = transfer_formats.iter().map(|f| f.as_str()).collect();
        sdp.push_str(&format!("a=accept-types:{}", formats.join(" ")));
        sdp.push_str(CRLF);
        if max_size > 0 {
            sdp.push_str(&format!("a=max-size:{}", max_size));
            sdp.push_str(CRLF);
        }
    }

    Some(sdp)
}
