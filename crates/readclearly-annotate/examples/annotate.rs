use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use readclearly_annotate::{Annotator, UnmatchedExtractor};
use readclearly_glossary::parse_table;
use readclearly_types::GlossarySource;

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let usage = "usage: cargo run -p readclearly-annotate --example annotate -- <glossary.csv> <file.html>";
    let glossary_path = args.next().map(PathBuf::from).context(usage)?;
    let html_path = args.next().map(PathBuf::from).context(usage)?;
    if args.next().is_some() {
        bail!("too many arguments");
    }

    let table = std::fs::read(&glossary_path)
        .with_context(|| format!("reading {}", glossary_path.display()))?;
    let html = std::fs::read_to_string(&html_path)
        .with_context(|| format!("reading {}", html_path.display()))?;

    let name = glossary_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("glossary");
    let glossary = Arc::new(parse_table(name, GlossarySource::Local, &table));
    let annotator = Annotator::new(glossary)?;
    let result = annotator.annotate(&html);
    let candidates = UnmatchedExtractor::default().extract(&result.html, result.matches.keys());

    println!("{}", result.html);
    eprintln!("\nMatched terms:");
    for (term, count) in &result.matches {
        eprintln!("  {:<30} {}", term, count);
    }

    let mut ranked: Vec<(&String, &u64)> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    eprintln!("\nTop candidates:");
    for (term, count) in ranked.into_iter().take(20) {
        eprintln!("  {:<30} {}", term, count);
    }

    Ok(())
}
