// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal scanning helpers for the small XML documents the engine parses.
//!
//! The RCS documents (IMDN, isComposing, geolocation push, FT-HTTP info) are
//! tiny and schema-fixed, so they are scanned rather than run through a full
//! XML stack. Inputs are untrusted: every helper is bounds-checked and the
//! callers cap input size.

/// Returns the text content of the first `<name>...</name>` element.
pub(crate) fn element_text<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}", name);
    let start = find_ignore_case(input, &open)?;
    let after_open = &input[start + open.len()..];
    // The tag may carry attributes; content starts after '>'
    let content_start = after_open.find('>')?;
    if after_open[..content_start].ends_with('/') {
        return None; // self-closing, no text
    }
    let content = &after_open[content_start + 1..];
    let close = format!("</{}", name);
    let end = find_ignore_case(content, &close)?;
    Some(content[..end].trim())
}

/// Returns the value of `attr="value"` on the first `<name ...>` element.
pub(crate) fn element_attr<'a>(input: &'a str, name: &str, attr: &str) -> Option<&'a str> {
    let open = format!("<{}", name);
    let start = find_ignore_case(input, &open)?;
    let after_open = &input[start + open.len()..];
    let tag_end = after_open.find('>')?;
    let tag = &after_open[..tag_end];
    attr_value(tag, attr)
}

/// Returns true when a `<name ...>` or `<name/>` element exists.
pub(crate) fn has_element(input: &str, name: &str) -> bool {
    let open = format!("<{}", name);
    match find_ignore_case(input, &open) {
        Some(pos) => {
            // Guard against prefix matches (<display> vs <displayed>)
            input[pos + open.len()..]
                .chars()
                .next()
                .map(|c| c == '>' || c == '/' || c == ' ' || c == '\t' || c == '\r' || c == '\n')
                .unwrap_or(false)
        }
        None => false,
    }
}

/// Scans an attribute list for `attr = "value"`, tolerating whitespace.
pub(crate) fn attr_value<'a>(tag: &'a str, attr: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(rel) = find_ignore_case(&tag[search..], attr) {
        let pos = search + rel;
        let after = &tag[pos + attr.len()..];
        let after_trim = after.trim_start();
        if let Some(rest) = after_trim.strip_prefix('=') {
            let rest = rest.trim_start();
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &rest[1..];
                let end = inner.find(quote)?;
                return Some(&inner[..end]);
            }
        }
        search = pos + attr.len();
    }
    None
}

/// Escapes text for inclusion in XML content or attribute values.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let haystack_bytes = haystack.as_bytes();
    let needle_bytes = needle.as_bytes();
    (0..=haystack_bytes.len() - needle_bytes.len()).find(|&i| {
        haystack_bytes[i..i + needle_bytes.len()].eq_ignore_ascii_case(needle_bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_text_basic() {
        let xml = "<imdn><message-id> abc </message-id></imdn>";
        assert_eq!(element_text(xml, "message-id"), Some("abc"));
        assert_eq!(element_text(xml, "missing"), None);
    }

    #[test]
    fn element_attr_basic() {
        let xml = r#"<data url="http://x/y" until="2026-01-01T00:00:00Z"/>"#;
        assert_eq!(element_attr(xml, "data", "url"), Some("http://x/y"));
        assert_eq!(
            element_attr(xml, "data", "until"),
            Some("2026-01-01T00:00:00Z")
        );
        assert_eq!(element_attr(xml, "data", "missing"), None);
    }

    #[test]
    fn has_element_rejects_prefix_match() {
        let xml = "<status><displayed/></status>";
        assert!(has_element(xml, "displayed"));
        assert!(!has_element(xml, "display"));
    }

    #[test]
    fn escape_special_characters() {
        assert_eq!(escape("a<b&c>\"d\""), "a&lt;b&amp;c&gt;&quot;d&quot;");
    }
}
