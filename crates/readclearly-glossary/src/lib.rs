//! Load ReadClearly glossaries from CSV tables.
//!
//! Glossaries live as `<name>.csv` files in a local directory or are fetched
//! from a remote [`GlossaryProvider`]. Parsed glossaries are cached in process
//! for a configurable TTL, remote tables are mirrored to an on-disk cache, and
//! anything unusable falls back to the default glossary named by
//! `glossary_list.csv`.
//!
//! # Table format
//! - first row is a header and is ignored;
//! - column 1 is the term, column 2 the explanation (rows without one are
//!   skipped);
//! - columns 3 and 4 optionally carry a secondary-language explanation and
//!   term.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use readclearly_glossary::{GlossaryStore, HttpGlossaryProvider, StoreConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let provider = HttpGlossaryProvider::new(
//!     readclearly_glossary::DEFAULT_REMOTE_URL,
//!     Duration::from_secs(5),
//! )?;
//! let store = GlossaryStore::new(StoreConfig::default(), Some(Arc::new(provider)));
//! let glossary = store.load(Some("housing")).await?;
//! println!("{} entries from {}", glossary.len(), glossary.source_token());
//! # Ok(()) }
//! ```
//!
//! For a runnable demo, see `cargo run -p readclearly-glossary --example stats -- <file.csv>`.

pub mod parse;
pub mod provider;
pub mod store;

pub use parse::{parse_rows, parse_table};
pub use provider::{DEFAULT_REMOTE_URL, GlossaryProvider, HttpGlossaryProvider, ProviderError};
pub use store::{GLOSSARY_LIST_FILE, GlossaryError, GlossaryStore, StoreConfig};
