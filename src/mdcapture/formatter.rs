//! Shapes raw note text into the block that gets written to disk.

use chrono::{DateTime, FixedOffset};

use crate::placeholder::expand;
use crate::template::NoteFormat;

/// Apply list items, the timestamp line and (for new files) front-matter.
///
/// Appended blocks start with a bare newline and never carry front-matter.
/// List formatting does not detect existing "- " prefixes, so running it on
/// already formatted text prefixes every line again.
pub fn format_note(text: &str, format: &NoteFormat, is_new_file: bool, at: &DateTime<FixedOffset>) -> String {
    let mut content = String::new();

    if is_new_file {
        if let Some(fm) = &format.front_matter {
            content.push_str("---\n");
            content.push_str(&fm.property);
            content.push_str(": ");
            content.push_str(&expand(&fm.value_template, at));
            content.push_str("\n---\n");
        }
    } else {
        content.push('\n');
    }

    if let Some(pattern) = &format.timestamp {
        content.push_str(&expand(pattern, at));
        content.push('\n');
    }

    match format.list_indent {
        Some(level) => content.push_str(&list_items(text, level)),
        None => content.push_str(text),
    }
    content
}

/// Prefix every line with `level` tabs and "- ".
pub fn list_items(text: &str, level: u8) -> String {
    let indent = "\t".repeat(level as usize);
    split_lines(text)
        .map(|line| format!("{}- {}", indent, line))
        .collect::<Vec<_>>()
        .join("\n")
}

// `str::lines` drops a trailing empty line; keep it so every newline in the
// note yields an item.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}
