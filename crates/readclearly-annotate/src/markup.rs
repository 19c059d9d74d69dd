//! Flat segmentation of HTML into text and markup.
//!
//! This is not a tree builder: it only needs to tell text apart from tags,
//! comments and declarations, and to keep `<script>`/`<style>` bodies out of
//! the text stream. Concatenating every segment's `raw()` reproduces the input
//! byte for byte.

use std::ops::Range;

const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// Body of a `<script>` or `<style>` element.
    RawText(&'a str),
    Tag(Tag<'a>),
    Comment(&'a str),
    /// `<!DOCTYPE ...>`, `<![CDATA[...]]>`, `<?...?>` and similar.
    Declaration(&'a str),
}

impl<'a> Segment<'a> {
    pub fn raw(&self) -> &'a str {
        match self {
            Segment::Text(s) | Segment::RawText(s) | Segment::Comment(s) | Segment::Declaration(s) => *s,
            Segment::Tag(tag) => tag.raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    pub raw: &'a str,
    /// Lower-cased element name.
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
}

impl<'a> Tag<'a> {
    fn parse(raw: &'a str) -> Self {
        let inner = raw.trim_start_matches('<').trim_end_matches('>');
        let closing = inner.starts_with('/');
        let body = inner.trim_start_matches('/');
        let name: String = body
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
            .collect::<String>()
            .to_ascii_lowercase();
        Self {
            raw,
            name,
            closing,
            self_closing: inner.trim_end().ends_with('/'),
        }
    }

    /// Value of an attribute, matched case-insensitively. Bare attributes
    /// yield an empty string.
    pub fn attr(&self, wanted: &str) -> Option<&'a str> {
        if self.closing {
            return None;
        }
        let raw = self.raw;
        let bytes = raw.as_bytes();
        // Skip `<` and the element name.
        let mut pos = 1 + self.name.len();
        let end = raw.len().saturating_sub(1);

        while pos < end {
            while pos < end && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
                pos += 1;
            }
            let name_start = pos;
            while pos < end
                && !bytes[pos].is_ascii_whitespace()
                && !matches!(bytes[pos], b'=' | b'/' | b'>')
            {
                pos += 1;
            }
            let name = &raw[name_start..pos];
            if name.is_empty() {
                pos += 1;
                continue;
            }

            while pos < end && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let value = if pos < end && bytes[pos] == b'=' {
                pos += 1;
                while pos < end && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                match bytes.get(pos) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let start = pos + 1;
                        let stop = raw[start..end]
                            .find(quote as char)
                            .map_or(end, |off| start + off);
                        pos = (stop + 1).min(end);
                        &raw[start..stop]
                    }
                    _ => {
                        let start = pos;
                        while pos < end && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>'
                        {
                            pos += 1;
                        }
                        &raw[start..pos]
                    }
                }
            } else {
                ""
            };

            if name.eq_ignore_ascii_case(wanted) {
                return Some(value);
            }
        }
        None
    }

    /// Whether the `class` attribute lists `class_name`.
    pub fn has_class(&self, class_name: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class_name))
    }
}

/// Split `html` into segments.
pub fn segments(html: &str) -> Vec<Segment<'_>> {
    let bytes = html.as_bytes();
    let mut out = Vec::new();
    let mut text_start = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let Some((kind, end)) = markup_at(html, pos) else {
            pos += 1;
            continue;
        };

        if text_start < pos {
            out.push(Segment::Text(&html[text_start..pos]));
        }
        let raw = &html[pos..end];
        pos = end;
        match kind {
            MarkupKind::Comment => out.push(Segment::Comment(raw)),
            MarkupKind::Declaration => out.push(Segment::Declaration(raw)),
            MarkupKind::Tag => {
                let tag = Tag::parse(raw);
                let raw_text = !tag.closing
                    && !tag.self_closing
                    && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str());
                let name = tag.name.clone();
                out.push(Segment::Tag(tag));
                if raw_text {
                    let body_end = find_closing_tag(html, pos, &name);
                    if pos < body_end {
                        out.push(Segment::RawText(&html[pos..body_end]));
                    }
                    pos = body_end;
                }
            }
        }
        text_start = pos;
    }

    if text_start < html.len() {
        out.push(Segment::Text(&html[text_start..]));
    }
    out
}

/// Byte ranges of character references (`&amp;`, `&#39;`, `&#x2014;`).
pub fn entity_ranges(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if bytes[pos] != b'&' {
            pos += 1;
            continue;
        }
        let mut end = pos + 1;
        if bytes.get(end) == Some(&b'#') {
            end += 1;
        }
        let name_start = end;
        while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
            end += 1;
        }
        if end > name_start && bytes.get(end) == Some(&b';') {
            ranges.push(pos..end + 1);
            pos = end + 1;
        } else {
            pos += 1;
        }
    }
    ranges
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

/// Tracks whether a walk over segments is inside a particular element,
/// following nesting of same-named elements.
pub(crate) struct Enclosure {
    name: &'static str,
    depth: usize,
}

impl Enclosure {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name, depth: 0 }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Feed a tag. Returns true when the tag opens, closes or sits inside the
    /// enclosure.
    pub(crate) fn observe(&mut self, tag: &Tag<'_>, opens: impl Fn(&Tag<'_>) -> bool) -> bool {
        if self.depth == 0 {
            if !tag.closing && !tag.self_closing && tag.name == self.name && opens(tag) {
                self.depth = 1;
                return true;
            }
            return false;
        }
        if tag.name == self.name {
            if tag.closing {
                self.depth -= 1;
            } else if !tag.self_closing {
                self.depth += 1;
            }
        }
        true
    }
}

enum MarkupKind {
    Tag,
    Comment,
    Declaration,
}

fn markup_at(html: &str, pos: usize) -> Option<(MarkupKind, usize)> {
    let rest = &html[pos..];
    let bytes = rest.as_bytes();
    match bytes.get(1)? {
        b'!' if rest.starts_with("<!--") => {
            let end = rest[4..].find("-->").map_or(html.len(), |off| pos + 4 + off + 3);
            Some((MarkupKind::Comment, end))
        }
        b'!' | b'?' => rest.find('>').map(|off| (MarkupKind::Declaration, pos + off + 1)),
        b'/' if bytes.get(2).is_some_and(u8::is_ascii_alphabetic) => {
            tag_end(bytes).map(|end| (MarkupKind::Tag, pos + end))
        }
        c if c.is_ascii_alphabetic() => tag_end(bytes).map(|end| (MarkupKind::Tag, pos + end)),
        _ => None,
    }
}

/// Offset just past the `>` closing a tag, honouring quoted attribute values.
fn tag_end(bytes: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (idx, &b) in bytes.iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(idx + 1),
                _ => {}
            },
        }
    }
    None
}

fn find_closing_tag(html: &str, from: usize, name: &str) -> usize {
    let needle = format!("</{name}");
    let haystack = html[from..].to_ascii_lowercase();
    haystack.find(&needle).map_or(html.len(), |off| from + off)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(html: &str) -> Vec<&'static str> {
        segments(html)
            .iter()
            .map(|s| match s {
                Segment::Text(_) => "text",
                Segment::RawText(_) => "raw",
                Segment::Tag(_) => "tag",
                Segment::Comment(_) => "comment",
                Segment::Declaration(_) => "decl",
            })
            .collect()
    }

    #[test]
    fn segments_round_trip_the_input() {
        let html = "<!DOCTYPE html><p class=\"a>b\">x &lt; y</p><!-- c --> 3 < 4<script>if (a<b) {}</script>";
        let rebuilt: String = segments(html).iter().map(Segment::raw).collect();
        assert_eq!(rebuilt, html);
        assert_eq!(
            kinds(html),
            vec!["decl", "tag", "text", "tag", "comment", "text", "tag", "raw", "tag"]
        );
    }

    #[test]
    fn stray_angle_brackets_stay_text() {
        assert_eq!(kinds("a < b and c <3"), vec!["text"]);
        assert_eq!(kinds("unterminated <b"), vec!["text"]);
    }

    #[test]
    fn reads_attributes() {
        let segs = segments(r#"<span class="oarc-word extra" data-glossary='it&#039;s' hidden>"#);
        let Segment::Tag(tag) = &segs[0] else {
            panic!("expected tag");
        };
        assert_eq!(tag.name, "span");
        assert!(tag.has_class("oarc-word"));
        assert!(!tag.has_class("oarc"));
        assert_eq!(tag.attr("DATA-GLOSSARY"), Some("it&#039;s"));
        assert_eq!(tag.attr("hidden"), Some(""));
        assert_eq!(tag.attr("id"), None);
    }

    #[test]
    fn finds_entities() {
        let text = "AT&amp;T &#39;x&#x2014; & fish &;";
        let found: Vec<&str> = entity_ranges(text).into_iter().map(|r| &text[r]).collect();
        assert_eq!(found, vec!["&amp;", "&#39;", "&#x2014;"]);
    }

    #[test]
    fn escapes_html_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
        );
    }
}
