//! Byte decoding for XML sources.
//!
//! Ebook documents are decoded as UTF-8 first (a byte-order mark wins). If the
//! XML prolog declares a different character set, the original bytes are
//! decoded again with the declared encoding and parsed a second time, which
//! recovers documents whose bytes and transport labelling disagree.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};

use crate::error::ReadError;
use crate::security::SecurityLimits;
use crate::xml::{self, XmlDocument};

/// Decode bytes as UTF-8, honouring a BOM for UTF-8 or UTF-16.
/// Malformed sequences become U+FFFD.
pub fn decode_utf8(bytes: &[u8]) -> Cow<'_, str> {
    let (text, _encoding, _malformed) = UTF_8.decode(bytes);
    text
}

/// Decode bytes with an encoding label such as `windows-1251`. Returns `None`
/// for labels encoding_rs does not know.
pub fn decode_with_label<'a>(bytes: &'a [u8], label: &str) -> Option<Cow<'a, str>> {
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    let (text, _, _) = encoding.decode(bytes);
    Some(text)
}

/// Read the `encoding="..."` pseudo-attribute straight from the prolog bytes.
///
/// Used when the first UTF-8 parse fails outright, so the parser never got to
/// report the declaration.
pub fn sniff_declared_encoding(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if !bytes.starts_with(b"<?xml") {
        return None;
    }
    let end = bytes.windows(2).position(|w| w == b"?>")?;
    let prolog = std::str::from_utf8(&bytes[..end]).ok()?;
    let rest = &prolog[prolog.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let close = value.find(quote)?;
    Some(value[..close].trim().to_string())
}

/// Decode and parse an XML document, re-decoding with the declared encoding
/// when it is not UTF-8.
pub fn parse_xml(bytes: &[u8], limits: &SecurityLimits) -> Result<XmlDocument, ReadError> {
    let text = decode_utf8(bytes);
    let first = xml::parse(&text, limits);

    let declared = match &first {
        Ok(doc) => doc.declared_encoding.clone(),
        Err(_) => sniff_declared_encoding(bytes),
    };
    let Some(encoding) = declared
        .as_deref()
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    else {
        return first;
    };
    if encoding == UTF_8 {
        return first;
    }

    tracing::debug!(encoding = encoding.name(), "re-decoding with declared encoding");
    let (text, _, _) = encoding.decode(bytes);
    xml::parse(&text, limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp1251_document() -> Vec<u8> {
        let mut bytes = br#"<?xml version="1.0" encoding="windows-1251"?><r>"#.to_vec();
        // "Привет" in windows-1251
        bytes.extend_from_slice(&[0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2]);
        bytes.extend_from_slice(b"</r>");
        bytes
    }

    #[test]
    fn sniff_reads_prolog() {
        assert_eq!(
            sniff_declared_encoding(br#"<?xml version="1.0" encoding='KOI8-R'?><a/>"#).as_deref(),
            Some("KOI8-R")
        );
        assert_eq!(sniff_declared_encoding(b"<?xml version=\"1.0\"?><a/>"), None);
        assert_eq!(sniff_declared_encoding(b"<a/>"), None);
    }

    #[test]
    fn declared_encoding_wins_over_utf8() {
        let doc = parse_xml(&cp1251_document(), &SecurityLimits::default()).unwrap();
        assert_eq!(doc.root.text_content(), "Привет");
    }

    #[test]
    fn utf8_documents_parse_once() {
        let src = "\u{FEFF}<?xml version=\"1.0\" encoding=\"utf-8\"?><r>Привет</r>";
        let doc = parse_xml(src.as_bytes(), &SecurityLimits::default()).unwrap();
        assert_eq!(doc.root.text_content(), "Привет");
    }

    #[test]
    fn unknown_label_keeps_utf8_result() {
        let src = r#"<?xml version="1.0" encoding="x-made-up"?><r>ok</r>"#;
        let doc = parse_xml(src.as_bytes(), &SecurityLimits::default()).unwrap();
        assert_eq!(doc.root.text_content(), "ok");
    }

    #[test]
    fn label_decoding() {
        assert_eq!(decode_with_label(&[0xCF], "windows-1251").as_deref(), Some("П"));
        assert!(decode_with_label(b"x", "nope").is_none());
    }
}
