//! Parser for the `Label: value` text returned by the generation service.

use once_cell::sync::Lazy;
use regex::Regex;
use strum::IntoEnumIterator;

use crate::model::{CatalogEntry, CatalogField};

static LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    let labels = CatalogField::iter()
        .map(|field| regex::escape(field.label()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)^\s*({labels})\s*:\s*(.*)$")).expect("label pattern is valid")
});

enum ScanState {
    ExpectLabel,
    /// Collecting the free-text description until the next label line.
    InDescription(Vec<String>),
}

fn match_label(line: &str) -> Option<(CatalogField, &str)> {
    let caps = LABEL_LINE.captures(line)?;
    let field = CatalogField::from_label(caps.get(1)?.as_str())?;
    let value = caps.get(2).map_or("", |m| m.as_str()).trim();
    Some((field, value))
}

/// Parses a response into a [`CatalogEntry`].
///
/// Unknown lines are ignored and missing labels stay empty, so any input
/// produces an entry. The `Description` value spans every non-empty line
/// up to the next recognised label.
pub fn parse_catalog_text(text: &str) -> CatalogEntry {
    let mut entry = CatalogEntry::default();
    let mut state = ScanState::ExpectLabel;

    for line in text.lines() {
        let labelled = match_label(line);

        if let ScanState::InDescription(parts) = &mut state {
            if labelled.is_none() {
                let continuation = line.trim();
                if !continuation.is_empty() {
                    parts.push(continuation.to_string());
                }
                continue;
            }
            entry.set(CatalogField::Description, parts.join(" ").trim());
            state = ScanState::ExpectLabel;
        }

        let Some((field, value)) = labelled else {
            continue;
        };

        if field == CatalogField::Description {
            let parts = if value.is_empty() {
                Vec::new()
            } else {
                vec![value.to_string()]
            };
            state = ScanState::InDescription(parts);
        } else {
            entry.set(field, value);
        }
    }

    if let ScanState::InDescription(parts) = state {
        entry.set(CatalogField::Description, parts.join(" ").trim());
    }

    entry
}
