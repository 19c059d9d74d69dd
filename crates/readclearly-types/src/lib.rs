//! Shared types for glossary-driven annotation.
//!
//! A [`Glossary`] is an ordered list of [`GlossaryEntry`] values, longest term
//! first. Annotation passes produce [`TermCounts`], which are later folded into
//! persistent counters bucketed by [`CounterCategory`] and [`Period`].
//!
//! ```rust
//! use readclearly_types::{Glossary, GlossaryEntry, GlossarySource, normalize_name};
//!
//! let name = normalize_name("family law").unwrap();
//! assert_eq!(name, "family_law");
//!
//! let glossary = Glossary::new(
//!     name,
//!     GlossarySource::Local,
//!     vec![
//!         GlossaryEntry::new("lien", "a legal claim on property"),
//!         GlossaryEntry::new("notice of default", "a formal warning"),
//!     ],
//! );
//! assert_eq!(glossary.entries()[0].term, "notice of default");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Term → occurrence count for a single pass. Keys are case-folded.
pub type TermCounts = BTreeMap<String, u64>;

/// One glossary row after cleanup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlossaryEntry {
    /// Case-folded lookup key.
    pub term: String,
    pub explanation: String,
    pub secondary: Option<SecondaryText>,
}

/// Second-language rendering of an entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecondaryText {
    pub explanation: String,
    /// Translated term; may be empty when only the explanation was provided.
    pub term: String,
}

impl GlossaryEntry {
    pub fn new(term: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            term: fold_term(&term.into()),
            explanation: explanation.into(),
            secondary: None,
        }
    }

    pub fn with_secondary(
        mut self,
        explanation: impl Into<String>,
        term: impl Into<String>,
    ) -> Self {
        self.secondary = Some(SecondaryText {
            explanation: explanation.into(),
            term: term.into(),
        });
        self
    }

    /// Length used for ordering, in characters.
    pub fn term_len(&self) -> usize {
        self.term.chars().count()
    }
}

/// Where the raw table of a glossary came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GlossarySource {
    /// `<glossary_dir>/<name>.csv`
    Local,
    /// Freshly fetched from the remote provider.
    Remote,
    /// On-disk copy of an earlier remote fetch.
    Cached,
}

impl fmt::Display for GlossarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GlossarySource::Local => "local",
            GlossarySource::Remote => "remote",
            GlossarySource::Cached => "cached",
        })
    }
}

/// Ordered glossary used for one annotation pass.
///
/// Entries are kept sorted by descending term length; ties preserve the
/// order they were supplied in.
#[derive(Clone, Debug)]
pub struct Glossary {
    name: String,
    source: GlossarySource,
    entries: Vec<GlossaryEntry>,
}

impl Glossary {
    /// Repeated terms keep the position of their first occurrence and the
    /// content of their last.
    pub fn new(name: impl Into<String>, source: GlossarySource, entries: Vec<GlossaryEntry>) -> Self {
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(entries.len());
        let mut unique: Vec<GlossaryEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match positions.get(&entry.term) {
                Some(&pos) => unique[pos] = entry,
                None => {
                    positions.insert(entry.term.clone(), unique.len());
                    unique.push(entry);
                }
            }
        }
        let mut entries = unique;
        // `sort_by` is stable, so equal lengths keep row order.
        entries.sort_by(|a, b| b.term_len().cmp(&a.term_len()));
        Self {
            name: name.into(),
            source,
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> GlossarySource {
        self.source
    }

    /// Token naming the glossary in counters and in the response trailer.
    pub fn source_token(&self) -> String {
        match self.source {
            GlossarySource::Local => format!("{}.csv", self.name),
            GlossarySource::Remote | GlossarySource::Cached => format!("cache/{}.csv", self.name),
        }
    }

    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    pub fn get(&self, term: &str) -> Option<&GlossaryEntry> {
        let key = fold_term(term);
        self.entries.iter().find(|e| e.term == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counter family a [`TermCounts`] map is merged into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum CounterCategory {
    Matched,
    Unmatched,
    Viewed,
    Translated,
}

impl CounterCategory {
    pub const ALL: [CounterCategory; 4] = [
        CounterCategory::Matched,
        CounterCategory::Unmatched,
        CounterCategory::Viewed,
        CounterCategory::Translated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CounterCategory::Matched => "matched",
            CounterCategory::Unmatched => "unmatched",
            CounterCategory::Viewed => "viewed",
            CounterCategory::Translated => "translated",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for CounterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(year, month)` bucket for counters. Months are 1-based.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Reader feedback on an explanation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VoteValue {
    Yes,
    No,
}

impl VoteValue {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(VoteValue::Yes),
            "no" => Some(VoteValue::No),
            _ => None,
        }
    }

    /// `(yes, no)` deltas for an additive vote increment.
    pub fn deltas(self) -> (u64, u64) {
        match self {
            VoteValue::Yes => (1, 0),
            VoteValue::No => (0, 1),
        }
    }
}

/// Restrict a glossary name to `[A-Za-z0-9_-]`, replacing anything else
/// with `_`. Blank input yields `None`.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

/// Case-fold a term for use as a glossary or counter key.
pub fn fold_term(raw: &str) -> String {
    raw.trim().to_lowercase()
}
