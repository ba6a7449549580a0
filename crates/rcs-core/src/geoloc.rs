// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geolocation push documents.
//!
//! A pushed location is a labelled WGS-84 point with an expiry:
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <rcsenvelope xmlns="urn:gsma:params:xml:ns:rcs:rcs:geolocation">
//! <rcspushlocation label="Home">
//! <gml:pos>48.8566 2.3522</gml:pos>
//! <expiry>2026-02-01T00:00:00Z</expiry>
//! </rcspushlocation>
//! </rcsenvelope>
//! ```

use smol_str::SmolStr;
use std::fmt;

use crate::xml;

const MAX_PARSE_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeolocError {
    InputTooLarge { max: usize, actual: usize },
    MissingPosition,
    InvalidPosition(String),
}

impl fmt::Display for GeolocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeolocError::InputTooLarge { max, actual } => {
                write!(f, "input too large (max {}, got {})", max, actual)
            }
            GeolocError::MissingPosition => write!(f, "missing position element"),
            GeolocError::InvalidPosition(pos) => write!(f, "invalid position: {}", pos),
        }
    }
}

impl std::error::Error for GeolocError {}

/// A pushed geolocation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocPush {
    pub label: Option<SmolStr>,
    pub latitude: f64,
    pub longitude: f64,
    pub expiry: Option<SmolStr>,
}

impl GeolocPush {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            label: None,
            latitude,
            longitude,
            expiry: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(SmolStr::new(label));
        self
    }

    pub fn with_expiry(mut self, expiry: &str) -> Self {
        self.expiry = Some(SmolStr::new(expiry));
        self
    }

    /// Serializes the push document to XML.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n");
        out.push_str("<rcsenvelope xmlns=\"urn:gsma:params:xml:ns:rcs:rcs:geolocation\">\r\n");
        match &self.label {
            Some(label) => out.push_str(&format!(
                "<rcspushlocation label=\"{}\">\r\n",
                xml::escape(label)
            )),
            None => out.push_str("<rcspushlocation>\r\n"),
        }
        out.push_str(&format!(
            "<gml:pos>{} {}</gml:pos>\r\n",
            self.latitude, self.longitude
        ));
        if let Some(expiry) = &self.expiry {
            out.push_str(&format!("<expiry>{}</expiry>\r\n", xml::escape(expiry)));
        }
        out.push_str("</rcspushlocation>\r\n");
        out.push_str("</rcsenvelope>");
        out
    }
}

/// Parses a geolocation push document.
pub fn parse_geoloc_document(input: &str) -> Result<GeolocPush, GeolocError> {
    if input.len() > MAX_PARSE_SIZE {
        return Err(GeolocError::InputTooLarge {
            max: MAX_PARSE_SIZE,
            actual: input.len(),
        });
    }

    let pos = xml::element_text(input, "gml:pos").ok_or(GeolocError::MissingPosition)?;
    let mut coords = pos.split_whitespace();
    let latitude = coords
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| GeolocError::InvalidPosition(pos.to_owned()))?;
    let longitude = coords
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| GeolocError::InvalidPosition(pos.to_owned()))?;

    Ok(GeolocPush {
        label: xml::element_attr(input, "rcspushlocation", "label").map(SmolStr::new),
        latitude,
        longitude,
        expiry: xml::element_text(input, "expiry").map(SmolStr::new),
    })
}
