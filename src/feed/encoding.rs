//! Character set detection for fetched documents.
//!
//! Feeds and pages arrive as raw bytes in whatever encoding the publisher
//! chose. Decoding picks the encoding in this order:
//!
//! - a byte order mark
//! - for XML, the `encoding` attribute of the `<?xml ...?>` declaration
//! - the `charset` parameter of the `Content-Type` header
//! - for HTML, a `charset=` in the first `<meta>` declaring one
//!
//! and falls back to UTF-8. Undecodable bytes become U+FFFD.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};

/// How far into a document to look for an in-band declaration.
const SNIFF_LIMIT: usize = 1024;

/// Decode an XML document to text.
pub fn decode_xml<'a>(bytes: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let declared = xml_declared_encoding(bytes).or_else(|| content_type.and_then(charset_param));
    decode(bytes, declared)
}

/// Decode an HTML page to text.
pub fn decode_html<'a>(bytes: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let declared = content_type
        .and_then(charset_param)
        .or_else(|| meta_charset(bytes));
    decode(bytes, declared)
}

fn decode<'a>(bytes: &'a [u8], declared: Option<&'static Encoding>) -> Cow<'a, str> {
    // A BOM overrides whatever was declared and is stripped from the output.
    let (text, _, _) = declared.unwrap_or(UTF_8).decode(bytes);
    text
}

/// Resolve an encoding label.
///
/// Labels are read from ASCII-compatible bytes, so UTF-16 labels can only
/// be wrong here and are treated as UTF-8.
fn lookup(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).map(|e| e.output_encoding())
}

/// Extract the `charset` parameter from a `Content-Type` value.
fn charset_param(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| lookup(value.trim().trim_matches('"')))
}

/// Read the `encoding` attribute of a leading XML declaration.
fn xml_declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let head = ascii_prefix(bytes);
    let head = head.trim_start();
    let decl = head.strip_prefix("<?xml")?;
    let decl = &decl[..decl.find("?>")?];
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    lookup(&value[..value.find(quote)?])
}

/// Find a `charset=` declared by a `<meta>` tag near the top of a page.
///
/// Covers both `<meta charset="...">` and the `http-equiv` form whose
/// `content` attribute carries a full content type.
fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = ascii_prefix(bytes).to_ascii_lowercase();
    let mut search = head.as_str();
    while let Some(start) = search.find("<meta") {
        let tag = &search[start..];
        let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
        if let Some(pos) = tag.find("charset=") {
            let value = tag[pos + "charset=".len()..].trim_start_matches(['"', '\'']);
            let end = value
                .find(|c: char| c == '"' || c == '\'' || c == ';' || c == '/' || c.is_whitespace())
                .unwrap_or(value.len());
            return lookup(&value[..end]);
        }
        search = &search[start + "<meta".len()..];
    }
    None
}

/// The leading bytes of a document as text, with non-ASCII bytes replaced.
fn ascii_prefix(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(SNIFF_LIMIT)];
    head.iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{fffd}' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_xml_defaults_to_utf8() {
        let bytes = "<?xml version=\"1.0\"?><t>café</t>".as_bytes();
        assert_eq!(decode_xml(bytes, None), "<?xml version=\"1.0\"?><t>café</t>");
    }

    #[test]
    fn test_decode_xml_uses_declaration() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><t>caf\xe9</t>";
        assert_eq!(
            decode_xml(bytes, Some("application/xml")),
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><t>café</t>"
        );
    }

    #[test]
    fn test_decode_xml_single_quoted_declaration() {
        let bytes = b"<?xml version='1.0' encoding = 'windows-1252'?><t>\x93hi\x94</t>";
        assert!(decode_xml(bytes, None).contains("\u{201c}hi\u{201d}"));
    }

    #[test]
    fn test_decode_xml_falls_back_to_content_type() {
        let bytes = b"<rss><title>caf\xe9</title></rss>";
        assert_eq!(
            decode_xml(bytes, Some("application/rss+xml; charset=\"iso-8859-1\"")),
            "<rss><title>café</title></rss>"
        );
    }

    #[test]
    fn test_decode_xml_declaration_wins_over_header() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><t>caf\xe9</t>";
        assert!(decode_xml(bytes, Some("text/xml; charset=utf-8")).ends_with("<t>café</t>"));
    }

    #[test]
    fn test_decode_bom_wins() {
        let mut bytes = vec![0xef, 0xbb, 0xbf];
        bytes.extend_from_slice("<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><t>café</t>".as_bytes());
        let text = decode_xml(&bytes, None);
        assert!(text.starts_with("<?xml"));
        assert!(text.ends_with("<t>café</t>"));
    }

    #[test]
    fn test_utf16_label_without_bom_is_utf8() {
        let bytes = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><t>café</t>".as_bytes();
        assert!(decode_xml(bytes, None).ends_with("<t>café</t>"));
    }

    #[test]
    fn test_unknown_label_is_ignored() {
        let bytes = "<?xml version=\"1.0\" encoding=\"x-made-up\"?><t>café</t>".as_bytes();
        assert!(decode_xml(bytes, None).ends_with("<t>café</t>"));
    }

    #[test]
    fn test_decode_html_meta_charset() {
        let bytes = b"<html><head><meta charset=\"iso-8859-1\"><title>caf\xe9</title>";
        assert!(decode_html(bytes, Some("text/html")).contains("<title>café</title>"));

        let bytes = b"<html><head><meta http-equiv=\"Content-Type\" \
            content=\"text/html; charset=windows-1252\"><title>caf\xe9</title>";
        assert!(decode_html(bytes, None).contains("<title>café</title>"));
    }

    #[test]
    fn test_decode_html_header_wins_over_meta() {
        let bytes = "<meta charset=\"iso-8859-1\"><title>café</title>".as_bytes();
        assert!(decode_html(bytes, Some("text/html; charset=utf-8")).contains("café"));
    }
}
