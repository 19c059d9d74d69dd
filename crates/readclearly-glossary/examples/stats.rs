use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use readclearly_glossary::parse_table;
use readclearly_types::GlossarySource;

fn main() -> Result<()> {
    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cargo run -p readclearly-glossary --example stats -- <glossary.csv>")?;

    let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("glossary");
    let glossary = parse_table(name, GlossarySource::Local, &bytes);

    let with_secondary = glossary
        .entries()
        .iter()
        .filter(|e| e.secondary.is_some())
        .count();
    let multi_word = glossary
        .entries()
        .iter()
        .filter(|e| e.term.contains(' '))
        .count();

    println!("Glossary      : {}", path.display());
    println!("Entries       : {}", glossary.len());
    println!("Multi-word    : {}", multi_word);
    println!("Secondary text: {}", with_secondary);

    println!("Longest terms:");
    for entry in glossary.entries().iter().take(5) {
        println!("  {:<30} {}", entry.term, entry.explanation);
    }

    Ok(())
}
