use readclearly_types::{Glossary, GlossaryEntry, GlossarySource};
use tracing::debug;

/// Parse a raw CSV glossary table.
///
/// The reader is lenient: ragged rows are accepted and undecodable records
/// are skipped like rows without an explanation.
pub fn parse_table(name: &str, source: GlossarySource, bytes: &[u8]) -> Glossary {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(err) => {
                debug!(glossary = name, row = idx + 1, "skipping unreadable row: {err}");
                // Keep row numbering aligned so the header is still row one.
                rows.push(Vec::new());
            }
        }
    }
    parse_rows(name, source, &rows)
}

/// Build a glossary from already-split rows. The first row is a header.
pub fn parse_rows<R, S>(name: &str, source: GlossarySource, rows: &[R]) -> Glossary
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut entries: Vec<GlossaryEntry> = Vec::new();
    let mut skipped = 0usize;

    for (lineno, row) in rows.iter().enumerate().skip(1) {
        let row: &[S] = row.as_ref();
        let column = |idx: usize| row.get(idx).map(|cell| cell.as_ref()).unwrap_or("");

        let explanation = clean_explanation(column(1));
        let term = clean_term(column(0));
        if explanation.is_empty() || term.is_empty() {
            debug!(glossary = name, row = lineno + 1, "skipping row without term or explanation");
            skipped += 1;
            continue;
        }

        let mut entry = GlossaryEntry::new(term, explanation);
        let secondary_explanation = column(2).trim();
        if !secondary_explanation.is_empty() {
            entry = entry.with_secondary(secondary_explanation, column(3).trim());
        }

        entries.push(entry);
    }

    // Repeated terms collapse in `Glossary::new`.
    let glossary = Glossary::new(name, source, entries);
    debug!(
        glossary = name,
        entries = glossary.len(),
        skipped,
        "parsed glossary table"
    );
    glossary
}

fn clean_term(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '#'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn clean_explanation(raw: &str) -> String {
    raw.trim()
        .trim_matches(',')
        .trim()
        .replace("\"\"", "\"")
}
