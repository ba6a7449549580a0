// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! File-transfer-over-HTTP info documents.
//!
//! The document announces an uploaded file (and optionally its thumbnail) to
//! the receiving side, which downloads it over HTTP instead of the MSRP
//! media plane:
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <file>
//! <file-info type="thumbnail">
//! <file-size>2048</file-size>
//! <content-type>image/jpeg</content-type>
//! <data url="https://ft.example.com/thumb/1" until="2026-02-01T00:00:00Z"/>
//! </file-info>
//! <file-info type="file">
//! <file-size>1048576</file-size>
//! <content-type>image/jpeg</content-type>
//! <data url="https://ft.example.com/file/1" until="2026-02-01T00:00:00Z"/>
//! </file-info>
//! </file>
//! ```
//!
//! Parsed documents are immutable.

use smol_str::SmolStr;
use std::fmt;

use crate::xml;

const MAX_PARSE_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtInfoError {
    InputTooLarge { max: usize, actual: usize },
    MissingFileRecord,
    MissingField(&'static str),
    InvalidFileSize(String),
}

impl fmt::Display for FtInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtInfoError::InputTooLarge { max, actual } => {
                write!(f, "input too large (max {}, got {})", max, actual)
            }
            FtInfoError::MissingFileRecord => write!(f, "missing file-info record of type file"),
            FtInfoError::MissingField(name) => write!(f, "missing field: {}", name),
            FtInfoError::InvalidFileSize(value) => write!(f, "invalid file size: {}", value),
        }
    }
}

impl std::error::Error for FtInfoError {}

/// Thumbnail sub-record of a file-info document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferHttpThumbnail {
    pub size: u64,
    pub content_type: SmolStr,
    pub url: SmolStr,
    pub validity: SmolStr,
}

/// Announcement of a file available over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferHttpInfo {
    pub file_size: u64,
    pub content_type: SmolStr,
    pub url: SmolStr,
    /// Expiry of the download URL
    pub validity: SmolStr,
    pub thumbnail: Option<FileTransferHttpThumbnail>,
}

impl FileTransferHttpInfo {
    /// Serializes the document to XML (used when relaying upload results).
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n");
        out.push_str("<file>\r\n");
        if let Some(thumbnail) = &self.thumbnail {
            out.push_str("<file-info type=\"thumbnail\">\r\n");
            out.push_str(&format!("<file-size>{}</file-size>\r\n", thumbnail.size));
            out.push_str(&format!(
                "<content-type>{}</content-type>\r\n",
                xml::escape(&thumbnail.content_type)
            ));
            out.push_str(&format!(
                "<data url=\"{}\" until=\"{}\"/>\r\n",
                xml::escape(&thumbnail.url),
                xml::escape(&thumbnail.validity)
            ));
            out.push_str("</file-info>\r\n");
        }
        out.push_str("<file-info type=\"file\">\r\n");
        out.push_str(&format!("<file-size>{}</file-size>\r\n", self.file_size));
        out.push_str(&format!(
            "<content-type>{}</content-type>\r\n",
            xml::escape(&self.content_type)
        ));
        out.push_str(&format!(
            "<data url=\"{}\" until=\"{}\"/>\r\n",
            xml::escape(&self.url),
            xml::escape(&self.validity)
        ));
        out.push_str("</file-info>\r\n");
        out.push_str("</file>");
        out
    }
}

/// Parses a file-transfer-over-HTTP info document.
pub fn parse_file_info(input: &[u8]) -> Result<FileTransferHttpInfo, FtInfoError> {
    if input.len() > MAX_PARSE_SIZE {
        return Err(FtInfoError::InputTooLarge {
            max: MAX_PARSE_SIZE,
            actual: input.len(),
        });
    }
    let text = String::from_utf8_lossy(input);

    let mut file_record = None;
    let mut thumbnail_record = None;

    // Walk every file-info section and classify it by its type attribute.
    let mut rest: &str = &text;
    while let Some(start) = rest.find("<file-info") {
        let section_start = &rest[start..];
        let end = section_start
            .find("</file-info>")
            .map(|e| e + "</file-info>".len())
            .unwrap_or(section_start.len());
        let section = &section_start[..end];

        let kind = xml::element_attr(section, "file-info", "type").unwrap_or("file");
        let record = parse_record(section)?;
        if kind.eq_ignore_ascii_case("thumbnail") {
            thumbnail_record = Some(record);
        } else {
            file_record = Some(record);
        }

        rest = &section_start[end..];
    }

    let file = file_record.ok_or(FtInfoError::MissingFileRecord)?;
    Ok(FileTransferHttpInfo {
        file_size: file.size,
        content_type: file.content_type,
        url: file.url,
        validity: file.validity,
        thumbnail: thumbnail_record.map(|t| FileTransferHttpThumbnail {
            size: t.size,
            content_type: t.content_type,
            url: t.url,
            validity: t.validity,
        }),
    })
}

struct Record {
    size: u64,
    content_type: SmolStr,
    url: SmolStr,
    validity: SmolStr,
}

fn parse_record(section: &str) -> Result<Record, FtInfoError> {
    let size_text =
        xml::element_text(section, "file-size").ok_or(FtInfoError::MissingField("file-size"))?;
    let size = size_text
        .parse::<u64>()
        .map_err(|_| FtInfoError::InvalidFileSize(size_text.to_owned()))?;
    let content_type = xml::element_text(section, "content-type")
        .ok_or(FtInfoError::MissingField("content-type"))?;
    let url =
        xml::element_attr(section, "data", "url").ok_or(FtInfoError::MissingField("url"))?;
    let validity =
        xml::element_attr(section, "data", "until").ok_or(FtInfoError::MissingField("until"))?;

    Ok(Record {
        size,
        content_type: SmolStr::new(content_type),
        url: SmolStr::new(url),
        validity: SmolStr::new(validity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileTransferHttpInfo {
        FileTransferHttpInfo {
            file_size: 1_048_576,
            content_type: SmolStr::new("image/jpeg"),
            url: SmolStr::new("https://ft.example.com/file/1"),
            validity: SmolStr::new("2026-02-01T00:00:00Z"),
            thumbnail: Some(FileTransferHttpThumbnail {
                size: 2048,
                content_type: SmolStr::new("image/jpeg"),
                url: SmolStr::new("https://ft.example.com/thumb/1"),
                validity: SmolStr::new("2026-02-01T00:00:00Z"),
            }),
        }
    }

    #[test]
    fn round_trip_with_thumbnail() {
        let info = sample();
        let parsed = parse_file_info(info.to_xml().as_bytes()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn round_trip_without_thumbnail() {
        let info = FileTransferHttpInfo {
            thumbnail: None,
            ..sample()
        };
        let parsed = parse_file_info(info.to_xml().as_bytes()).unwrap();
        assert_eq!(parsed.thumbnail, None);
        assert_eq!(parsed.file_size, 1_048_576);
    }

    #[test]
    fn reject_document_without_file_record() {
        let xml = "<?xml version=\"1.0\"?><file></file>";
        assert_eq!(
            parse_file_info(xml.as_bytes()),
            Err(FtInfoError::MissingFileRecord)
        );
    }

    #[test]
    fn reject_invalid_size() {
        let xml = "<file><file-info type=\"file\">\
            <file-size>huge</file-size>\
            <content-type>image/png</content-type>\
            <data url=\"https://x\" until=\"2026\"/>\
            </file-info></file>";
        assert!(matches!(
            parse_file_info(xml.as_bytes()),
            Err(FtInfoError::InvalidFileSize(_))
        ));
    }

    #[test]
    fn untyped_record_reads_as_file() {
        let xml = "<file><file-info>\
            <file-size>10</file-size>\
            <content-type>text/plain</content-type>\
            <data url=\"https://x\" until=\"2026\"/>\
            </file-info></file>";
        let info = parse_file_info(xml.as_bytes()).unwrap();
        assert_eq!(info.file_size, 10);
    }
}
