use std::collections::HashSet;

use readclearly_types::{TermCounts, fold_term};

use crate::annotator::is_annotation;
use crate::markup::{Enclosure, Segment, Tag, entity_ranges, segments};

/// Id of the widget's "show glossary" toggle, which may be posted back
/// together with the content.
pub const ACTIVATE_ID: &str = "oarc-activate";

const DEFAULT_MIN_LEN: usize = 6;
const DEFAULT_EXTRA_CHARS: [char; 3] = ['&', '+', '-'];

/// Heuristics for picking candidate terms out of unmatched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Tokens shorter than this many characters are ignored.
    pub min_len: usize,
    /// Characters kept inside tokens besides ASCII letters and digits.
    pub extra_chars: Vec<char>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_LEN,
            extra_chars: DEFAULT_EXTRA_CHARS.to_vec(),
        }
    }
}

/// Collects frequent words that the glossary did not cover.
#[derive(Debug, Clone, Default)]
pub struct UnmatchedExtractor {
    config: ExtractConfig,
}

impl UnmatchedExtractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Count candidate terms in annotated markup, skipping anything already
    /// wrapped and any token equal to a matched term.
    pub fn extract<I, S>(&self, annotated_html: &str, matched_terms: I) -> TermCounts
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matched: HashSet<String> = matched_terms
            .into_iter()
            .map(|t| fold_term(t.as_ref()))
            .collect();

        let plain = self.visible_text(annotated_html);
        let cleaned: String = plain
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || self.config.extra_chars.contains(&c) {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut counts = TermCounts::new();
        for token in cleaned.split_whitespace() {
            if token.len() < self.config.min_len {
                continue;
            }
            let token = token.to_ascii_lowercase();
            if matched.contains(&token) {
                continue;
            }
            *counts.entry(token).or_default() += 1;
        }
        counts
    }

    /// Text outside annotations and the activation toggle, with markup
    /// stripped. Removed regions leave a single space behind so neighbouring
    /// words do not fuse.
    fn visible_text(&self, html: &str) -> String {
        let mut plain = String::with_capacity(html.len());
        let mut wrapper = Enclosure::new("span");
        let mut activate = Enclosure::new("div");

        for segment in segments(html) {
            match &segment {
                Segment::Tag(tag) => {
                    if activate.is_open() {
                        activate.observe(tag, is_activate);
                    } else if wrapper.is_open() {
                        wrapper.observe(tag, is_annotation);
                    } else if wrapper.observe(tag, is_annotation) || activate.observe(tag, is_activate)
                    {
                        plain.push(' ');
                    }
                }
                Segment::Text(text) if !wrapper.is_open() && !activate.is_open() => {
                    push_without_entities(text, &mut plain);
                }
                _ => {}
            }
        }
        plain
    }
}

fn is_activate(tag: &Tag<'_>) -> bool {
    tag.attr("id") == Some(ACTIVATE_ID)
}

fn push_without_entities(text: &str, out: &mut String) {
    let mut cursor = 0usize;
    for range in entity_ranges(text) {
        out.push_str(&text[cursor..range.start]);
        out.push(' ');
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
}
