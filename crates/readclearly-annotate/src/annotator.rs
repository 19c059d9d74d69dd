use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use readclearly_types::{Glossary, TermCounts};
use thiserror::Error;
use tracing::debug;

use crate::markup::{Enclosure, Segment, Tag, entity_ranges, escape_html, segments};

/// Class of the wrapper placed around every annotated term.
pub const WORD_CLASS: &str = "oarc-word";
/// Class of the empty marker element closing every annotated term.
pub const MARKER_CLASS: &str = "oarc-marker";

const MARKER_HTML: &str = r#"<span class="oarc-marker"></span>"#;

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("failed to build term matcher: {0}")]
    Build(#[from] aho_corasick::BuildError),
}

/// Result of one annotation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub html: String,
    /// Matched terms with their substitution counts; never contains zeros.
    pub matches: TermCounts,
}

/// Tags glossary terms in HTML.
///
/// All terms are compiled into one Aho-Corasick automaton. Each text node is
/// scanned once for every overlapping occurrence; occurrences that fail the
/// boundary rules are dropped. The rest are claimed term by term in glossary
/// order (longest first), left to right, skipping any that overlap text an
/// earlier term already claimed. That is the result of tagging each term in
/// turn, without rescanning the document per term.
pub struct Annotator {
    glossary: Arc<Glossary>,
    matcher: Option<AhoCorasick>,
    openings: Vec<String>,
}

impl Annotator {
    pub fn new(glossary: Arc<Glossary>) -> Result<Self, AnnotateError> {
        let matcher = if glossary.is_empty() {
            None
        } else {
            let patterns: Vec<&str> = glossary.entries().iter().map(|e| e.term.as_str()).collect();
            Some(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::Standard)
                    .build(patterns)?,
            )
        };
        let openings: Vec<String> = glossary.entries().iter().map(|entry| {
            let mut open = format!(
                r#"<span class="{WORD_CLASS}" data-glossary="{}""#,
                escape_html(&entry.explanation)
            );
            if let Some(secondary) = &entry.secondary {
                open.push_str(&format!(
                    r#" data-glossary-es-desc="{}" data-glossary-es="{}""#,
                    escape_html(&secondary.explanation),
                    escape_html(&secondary.term)
                ));
            }
            open.push('>');
            open
        })
        .collect();
        Ok(Self {
            openings,
            matcher,
            glossary,
        })
    }

    pub fn glossary(&self) -> &Arc<Glossary> {
        &self.glossary
    }

    pub fn annotate(&self, html: &str) -> Annotation {
        let mut out = String::with_capacity(html.len() + html.len() / 4);
        let mut matches = TermCounts::new();
        let mut wrapper = Enclosure::new("span");

        for segment in segments(html) {
            match &segment {
                Segment::Tag(tag) => {
                    wrapper.observe(tag, is_annotation);
                    out.push_str(tag.raw);
                }
                Segment::Text(text) if !wrapper.is_open() => {
                    self.annotate_text(text, &mut out, &mut matches);
                }
                other => out.push_str(other.raw()),
            }
        }

        debug!(
            glossary = self.glossary.name(),
            terms = matches.len(),
            "annotation pass complete"
        );
        Annotation { html: out, matches }
    }

    fn annotate_text(&self, text: &str, out: &mut String, matches: &mut TermCounts) {
        let Some(matcher) = &self.matcher else {
            out.push_str(text);
            return;
        };

        let entities = entity_ranges(text);
        let mut candidates: Vec<(usize, usize, usize)> = matcher
            .find_overlapping_iter(text)
            .filter(|m| accepts(text, m.range(), &entities))
            .map(|m| (m.start(), m.end(), m.pattern().as_usize()))
            .collect();
        if candidates.is_empty() {
            out.push_str(text);
            return;
        }
        // Longest terms claim text first; glossary order is already longest
        // first with ties in row order.
        candidates.sort_unstable_by_key(|&(start, _, idx)| (idx, start));
        let mut accepted: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for (start, end, idx) in candidates {
            let overlaps = accepted
                .range(..end)
                .next_back()
                .is_some_and(|(_, &(prev_end, _))| prev_end > start);
            if !overlaps {
                accepted.insert(start, (end, idx));
            }
        }

        let mut cursor = 0usize;
        for (start, (end, idx)) in accepted {
            out.push_str(&text[cursor..start]);
            out.push_str(&self.openings[idx]);
            out.push_str(&text[start..end]);
            out.push_str(MARKER_HTML);
            out.push_str("</span>");
            *matches
                .entry(self.glossary.entries()[idx].term.clone())
                .or_default() += 1;
            cursor = end;
        }
        out.push_str(&text[cursor..]);
    }
}

pub(crate) fn is_annotation(tag: &Tag<'_>) -> bool {
    tag.has_class(WORD_CLASS)
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Boundary rules: no word character, `/` or `.` directly before; no word
/// character or `/` directly after; never inside a character reference.
fn accepts(text: &str, range: Range<usize>, entities: &[Range<usize>]) -> bool {
    if range.is_empty() {
        return false;
    }
    if let Some(prev) = text[..range.start].chars().next_back() {
        if is_word_char(prev) || prev == '/' || prev == '.' {
            return false;
        }
    }
    if let Some(next) = text[range.end..].chars().next() {
        if is_word_char(next) || next == '/' {
            return false;
        }
    }
    !entities
        .iter()
        .any(|e| range.start < e.end && e.start < range.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use readclearly_types::{GlossaryEntry, GlossarySource};

    fn annotator(entries: Vec<GlossaryEntry>) -> Annotator {
        Annotator::new(Arc::new(Glossary::new("test", GlossarySource::Local, entries))).unwrap()
    }

    #[test]
    fn boundary_rules() {
        let text = "a lien, liens, /lien, .lien, lien/ x_lien";
        let hits: Vec<usize> = [2usize, 8, 16, 23, 29, 37]
            .into_iter()
            .filter(|&start| accepts(text, start..start + 4, &[]))
            .collect();
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn empty_glossary_passes_markup_through() {
        let result = annotator(Vec::new()).annotate("<p>anything</p>");
        assert_eq!(result.html, "<p>anything</p>");
        assert!(result.matches.is_empty());
    }

    #[test]
    fn secondary_attributes_are_rendered_and_escaped() {
        let result = annotator(vec![
            GlossaryEntry::new("eviction", "being \"forced\" out").with_secondary("desalojo <legal>", "desalojo"),
        ])
        .annotate("An eviction notice.");
        assert_eq!(
            result.html,
            "An <span class=\"oarc-word\" data-glossary=\"being &quot;forced&quot; out\" \
             data-glossary-es-desc=\"desalojo &lt;legal&gt;\" data-glossary-es=\"desalojo\">eviction\
             <span class=\"oarc-marker\"></span></span> notice."
        );
    }

    #[test]
    fn skips_entities_and_script_bodies() {
        let result = annotator(vec![GlossaryEntry::new("amp", "x"), GlossaryEntry::new("lien", "y")])
            .annotate("AT&amp;T <script>var lien = 1;</script><style>.lien{}</style>");
        assert!(result.matches.is_empty());
    }
}
