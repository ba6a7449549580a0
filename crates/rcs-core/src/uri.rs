// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact SIP URI representation.
//!
//! Holds the subset of RFC 3261 URI syntax the messaging engine consumes:
//! scheme, user part, host, port, and parameters.

use smol_str::SmolStr;
use std::fmt;

const MAX_URI_LENGTH: usize = 512;

/// A sip: or sips: URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    /// True for sips: scheme
    pub sips: bool,
    pub user: Option<SmolStr>,
    pub host: SmolStr,
    pub port: Option<u16>,
    /// URI parameters in original order; flag parameters carry no value
    pub params: Vec<(SmolStr, Option<SmolStr>)>,
}

impl SipUri {
    /// Parses a SIP URI, optionally wrapped in angle brackets.
    /// Returns None for non-SIP schemes or malformed input.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_URI_LENGTH {
            return None;
        }

        // Strip display name and angle brackets
        let inner = match trimmed.find('<') {
            Some(start) => {
                let end = trimmed[start + 1..].find('>')?;
                &trimmed[start + 1..start + 1 + end]
            }
            None => trimmed,
        };

        let (sips, rest) = if let Some(rest) = strip_scheme(inner, "sips:") {
            (true, rest)
        } else if let Some(rest) = strip_scheme(inner, "sip:") {
            (false, rest)
        } else {
            return None;
        };

        let (addr, params_str) = match rest.split_once(';') {
            Some((addr, params)) => (addr, Some(params)),
            None => (rest, None),
        };

        let (user, host_port) = match addr.rsplit_once('@') {
            Some((user, host_port)) => {
                if user.is_empty() {
                    return None;
                }
                (Some(SmolStr::new(user)), host_port)
            }
            None => (None, addr),
        };

        // Bracketed IPv6 hosts keep their colons
        let (host, port) = if host_port.starts_with('[') {
            let end = host_port.find(']')?;
            let host = &host_port[..=end];
            match host_port[end + 1..].strip_prefix(':') {
                Some(port) => (host, Some(port.parse::<u16>().ok()?)),
                None => (host, None),
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port.parse::<u16>().ok()?)),
                None => (host_port, None),
            }
        };
        if host.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        if let Some(params_str) = params_str {
            for param in params_str.split(';') {
                if param.is_empty() {
                    continue;
                }
                match param.split_once('=') {
                    Some((name, value)) => {
                        params.push((SmolStr::new(name.trim()), Some(SmolStr::new(value.trim()))))
                    }
                    None => params.push((SmolStr::new(param.trim()), None)),
                }
            }
        }

        Some(Self {
            sips,
            user,
            host: SmolStr::new(host),
            port,
            params,
        })
    }

    /// Returns the value of a URI parameter, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    /// Returns the canonical string form without parameters.
    pub fn base(&self) -> String {
        let scheme = if self.sips { "sips" } else { "sip" };
        let mut out = format!("{}:", scheme);
        if let Some(user) = &self.user {
            out.push_str(user);
            out.push('@');
        }
        out.push_str(&self.host);
        if let Some(port) = self.port {
            out.push_str(&format!(":{}", port));
        }
        out
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base())?;
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

fn strip_scheme<'a>(input: &'a str, scheme: &str) -> Option<&'a str> {
    if input.len() >= scheme.len() && input[..scheme.len()].eq_ignore_ascii_case(scheme) {
        Some(&input[scheme.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_uri() {
        let uri = SipUri::parse("sip:alice@example.com").unwrap();
        assert!(!uri.sips);
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host.as_str(), "example.com");
        assert_eq!(uri.port, None);
    }

    #[test]
    fn parse_with_port_and_params() {
        let uri = SipUri::parse("sip:bob@host.net:5061;transport=tcp;lr").unwrap();
        assert_eq!(uri.port, Some(5061));
        assert_eq!(uri.param("transport"), Some("tcp"));
        assert!(uri.params.iter().any(|(n, v)| n == "lr" && v.is_none()));
    }

    #[test]
    fn parse_angle_brackets_with_display_name() {
        let uri = SipUri::parse("Alice <sip:alice@example.com>;tag=abc").unwrap();
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host.as_str(), "example.com");
        // tag was outside the brackets, not a URI parameter
        assert!(uri.params.is_empty());
    }

    #[test]
    fn parse_sips() {
        let uri = SipUri::parse("sips:conf-factory@ims.mnc.org").unwrap();
        assert!(uri.sips);
        assert_eq!(uri.user.as_deref(), Some("conf-factory"));
    }

    #[test]
    fn reject_non_sip_schemes() {
        assert!(SipUri::parse("http://example.com").is_none());
        assert!(SipUri::parse("tel:+15551234567").is_none());
        assert!(SipUri::parse("").is_none());
    }

    #[test]
    fn display_round_trip() {
        let raw = "sip:alice@example.com:5060;transport=tcp";
        let uri = SipUri::parse(raw).unwrap();
        assert_eq!(uri.to_string(), raw);
        assert_eq!(SipUri::parse(&uri.to_string()), Some(uri));
    }
}
