//! RSS and Atom parsing.
//!
//! The format is detected from the document's root element (`<rss>`,
//! `<rdf:RDF>` or `<feed>`), never from the content type alone. Items keep
//! their document order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use roxmltree::{Document, Node, ParsingOptions};

use crate::error::ParseError;
use crate::feed::encoding::decode_xml;
use crate::feed::types::{FeedItem, FeedKind, ParsedFeed};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const RSS1_NS: &str = "http://purl.org/rss/1.0/";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Default maximum snippet length in characters.
pub const DEFAULT_MAX_SNIPPET_LENGTH: usize = 10000;

/// Parse a feed with the default snippet length.
pub fn parse_feed(
    bytes: &[u8],
    content_type_hint: Option<&str>,
) -> Result<ParsedFeed, ParseError> {
    FeedParser::default().parse(bytes, content_type_hint)
}

/// Feed parser.
#[derive(Debug, Clone, Copy)]
pub struct FeedParser {
    max_snippet_length: usize,
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNIPPET_LENGTH)
    }
}

impl FeedParser {
    /// Create a parser that truncates snippets to `max_snippet_length` characters.
    pub fn new(max_snippet_length: usize) -> Self {
        Self { max_snippet_length }
    }

    /// Parse a raw payload into a feed document.
    ///
    /// `content_type_hint` is only consulted to classify payloads that are
    /// not XML at all: an HTML response is reported as
    /// [`ParseError::UnsupportedFormat`] instead of `Malformed`.
    pub fn parse(
        &self,
        bytes: &[u8],
        content_type_hint: Option<&str>,
    ) -> Result<ParsedFeed, ParseError> {
        let text = decode_xml(bytes, content_type_hint);
        let text = text.trim_start();
        if text.is_empty() {
            return Err(ParseError::Malformed("empty document".to_string()));
        }

        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = match Document::parse_with_options(text, options) {
            Ok(doc) => doc,
            Err(e) => {
                if is_html(content_type_hint, text) {
                    return Err(ParseError::UnsupportedFormat("html".to_string()));
                }
                return Err(ParseError::Malformed(e.to_string()));
            }
        };

        let root = doc.root_element();
        match root.tag_name().name() {
            "rss" => {
                let ns = root.tag_name().namespace();
                let channel = child(root, ns, "channel")
                    .ok_or_else(|| ParseError::Malformed("missing <channel>".to_string()))?;
                Ok(self.parse_rss_channel(channel, channel.children(), ns))
            }
            "RDF" => {
                // RSS 1.0 keeps items as siblings of the channel.
                let ns = Some(RSS1_NS);
                let channel = child(root, ns, "channel")
                    .ok_or_else(|| ParseError::Malformed("missing <channel>".to_string()))?;
                Ok(self.parse_rss_channel(channel, root.children(), ns))
            }
            "feed" => Ok(self.parse_atom(root, root.tag_name().namespace())),
            other => Err(ParseError::UnsupportedFormat(other.to_string())),
        }
    }

    fn parse_rss_channel<'a, 'i: 'a>(
        &self,
        channel: Node<'a, 'i>,
        item_parent: impl Iterator<Item = Node<'a, 'i>>,
        ns: Option<&str>,
    ) -> ParsedFeed {
        let items = item_parent
            .filter(|n| is_element(*n, ns, "item"))
            .map(|n| self.parse_rss_item(n, ns))
            .collect();

        ParsedFeed {
            kind: FeedKind::Rss,
            title: child_text(channel, ns, "title").unwrap_or_default(),
            site_url: child_text(channel, ns, "link").or_else(|| atom_link(channel, Some(ATOM_NS))),
            description: child_text(channel, ns, "description").map(|d| strip_html(&d)),
            items,
        }
    }

    fn parse_rss_item(&self, item: Node<'_, '_>, ns: Option<&str>) -> FeedItem {
        let description = child_text(item, ns, "description");
        let content = child_text(item, Some(CONTENT_NS), "encoded").or_else(|| description.clone());

        FeedItem {
            title: child_text(item, ns, "title").unwrap_or_default(),
            link: child_text(item, ns, "link").or_else(|| atom_link(item, Some(ATOM_NS))),
            guid: child_text(item, ns, "guid"),
            author: child_text(item, ns, "author").or_else(|| child_text(item, Some(DC_NS), "creator")),
            published_at: child_text(item, ns, "pubDate")
                .or_else(|| child_text(item, Some(DC_NS), "date"))
                .and_then(|d| parse_date(&d)),
            content_snippet: self.snippet(description.as_deref().or(content.as_deref())),
            content,
        }
    }

    fn parse_atom(&self, feed: Node<'_, '_>, ns: Option<&str>) -> ParsedFeed {
        let items = feed
            .children()
            .filter(|n| is_element(*n, ns, "entry"))
            .map(|entry| {
                let summary = child_text(entry, ns, "summary");
                let content = atom_content(entry, ns).or_else(|| summary.clone());

                FeedItem {
                    title: child_text(entry, ns, "title").unwrap_or_default(),
                    link: atom_link(entry, ns),
                    guid: child_text(entry, ns, "id"),
                    author: child(entry, ns, "author").and_then(|a| child_text(a, ns, "name")),
                    published_at: child_text(entry, ns, "published")
                        .or_else(|| child_text(entry, ns, "updated"))
                        .and_then(|d| parse_date(&d)),
                    content_snippet: self.snippet(summary.as_deref().or(content.as_deref())),
                    content,
                }
            })
            .collect();

        ParsedFeed {
            kind: FeedKind::Atom,
            title: child_text(feed, ns, "title").unwrap_or_default(),
            site_url: atom_link(feed, ns),
            description: child_text(feed, ns, "subtitle").map(|d| strip_html(&d)),
            items,
        }
    }

    fn snippet(&self, html: Option<&str>) -> Option<String> {
        let text = strip_html(html?);
        if text.is_empty() {
            return None;
        }
        Some(truncate_chars(&text, self.max_snippet_length))
    }
}

fn is_html(content_type_hint: Option<&str>, text: &str) -> bool {
    if let Some(ct) = content_type_hint {
        if ct.to_ascii_lowercase().contains("html") {
            return true;
        }
    }
    let head: String = text.chars().take(15).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn is_element(node: Node<'_, '_>, ns: Option<&str>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == ns
}

fn child<'a, 'i>(node: Node<'a, 'i>, ns: Option<&str>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| is_element(*n, ns, name))
}

/// Trimmed text content of the first matching child, `None` if absent or blank.
fn child_text(node: Node<'_, '_>, ns: Option<&str>, name: &str) -> Option<String> {
    let text: String = child(node, ns, name)?
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Body of an Atom `<content>` element.
///
/// `type="xhtml"` content is inline markup wrapped in a single `<div>`; the
/// markup inside the div is returned as written rather than flattened to text.
fn atom_content(entry: Node<'_, '_>, ns: Option<&str>) -> Option<String> {
    let content = child(entry, ns, "content")?;
    if content.attribute("type") != Some("xhtml") {
        return child_text(entry, ns, "content");
    }

    let div = content
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "div")?;
    let (first, last) = (div.first_child()?, div.last_child()?);
    let markup = div.document().input_text()[first.range().start..last.range().end].trim();
    (!markup.is_empty()).then(|| markup.to_string())
}

/// The `href` of the `alternate` link (or the first link) among `<link>` children.
fn atom_link(node: Node<'_, '_>, ns: Option<&str>) -> Option<String> {
    let links: Vec<Node> = node.children().filter(|n| is_element(*n, ns, "link")).collect();
    links
        .iter()
        .find(|l| matches!(l.attribute("rel"), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| l.attribute("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

/// Parse the date formats seen in the wild, `None` if none match.
pub(crate) fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Remove markup, decode entities and collapse whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(pos) = rest.find(['<', '&']) {
        text.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if rest.starts_with('<') {
            // Tags become whitespace so adjacent blocks don't run together.
            match rest.find('>') {
                Some(end) => {
                    text.push(' ');
                    rest = &rest[end + 1..];
                }
                None => {
                    rest = "";
                }
            }
            continue;
        }

        // An entity is `&name;` within a short window.
        let decoded = rest[1..]
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .and_then(|(end, _)| decode_entity(&rest[1..end + 1]).map(|c| (c, end + 2)));
        match decoded {
            Some((c, consumed)) => {
                text.push(c);
                rest = &rest[consumed..];
            }
            None => {
                text.push('&');
                rest = &rest[1..];
            }
        }
    }
    text.push_str(rest);

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "hellip" => Some('…'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        "rsquo" => Some('’'),
        "lsquo" => Some('‘'),
        "rdquo" => Some('”'),
        "ldquo" => Some('“'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
