//! Tag glossary terms in HTML and surface the words the glossary missed.
//!
//! [`Annotator`] wraps every whole-word, case-insensitive occurrence of a
//! glossary term in a `span.oarc-word` carrying the (escaped) explanation,
//! with an empty `span.oarc-marker` as the last child. Text that is already
//! inside such a wrapper, inside `<script>`/`<style>`, inside a tag or inside
//! a character reference is never touched, so annotating annotated output is a
//! no-op.
//!
//! [`UnmatchedExtractor`] then strips the wrappers and the remaining markup and
//! counts long words that are not glossary terms, as curation candidates.
//!
//! # How matching works
//! 1. Split the markup into text and tag segments ([`markup::segments`]).
//! 2. Scan each text segment once with an Aho-Corasick automaton over all
//!    terms, collecting overlapping occurrences.
//! 3. Drop occurrences with a word character, `/` or `.` before them, or a
//!    word character or `/` after them.
//! 4. Let each term, longest first, claim its occurrences left to right,
//!    skipping any that overlap an occurrence already claimed.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//!
//! use readclearly_annotate::{Annotator, UnmatchedExtractor};
//! use readclearly_types::{Glossary, GlossaryEntry, GlossarySource};
//!
//! let glossary = Arc::new(Glossary::new(
//!     "default",
//!     GlossarySource::Local,
//!     vec![GlossaryEntry::new("lien", "a legal claim on property")],
//! ));
//! let annotator = Annotator::new(glossary).unwrap();
//! let result = annotator.annotate("<p>The bank filed a lien on the house.</p>");
//! assert_eq!(result.matches.get("lien"), Some(&1));
//!
//! let candidates = UnmatchedExtractor::default().extract(&result.html, result.matches.keys());
//! assert!(candidates.is_empty());
//! ```
//!
//! For a runnable demo, see `cargo run -p readclearly-annotate --example annotate -- <glossary.csv> <file.html>`.

pub mod annotator;
pub mod extract;
pub mod markup;

pub use annotator::{AnnotateError, Annotation, Annotator, MARKER_CLASS, WORD_CLASS};
pub use extract::{ACTIVATE_ID, ExtractConfig, UnmatchedExtractor};
