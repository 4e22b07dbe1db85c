//! Rendering of the uploaded-images table.

use std::time::SystemTime;

use chrono::{DateTime, Local};

/// First-column label, including its trailing space.
const NAME_LABEL: &str = "Имя файла ";

/// Remainder of the header row. The creation column is padded so the
/// 19-character timestamps below line up under it.
const DATE_LABELS: &str = "| Дата создания       | Дата обновления\n";

const DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Renders the fixed-schema table for the given rows.
///
/// `rows` are `(full file name, created_at, updated_at)` triples, already
/// truncated to the caller's limit; the same slice drives both the width
/// pass and the row pass, so the prefix measured is the prefix printed.
/// Widths are counted in code points, not bytes, so Cyrillic names line up
/// with the Russian header.
pub(crate) fn render(rows: &[(String, SystemTime, SystemTime)]) -> String {
    let label_width = NAME_LABEL.chars().count();
    let name_width = rows
        .iter()
        .map(|(full_name, _, _)| full_name.chars().count())
        .max()
        .map_or(label_width, |longest| longest.max(label_width));

    let mut table = String::new();
    table.push_str(NAME_LABEL);
    table.push_str(&" ".repeat(name_width - label_width));
    table.push_str(DATE_LABELS);

    for (full_name, created_at, updated_at) in rows {
        table.push_str(full_name);
        table.push_str(&" ".repeat(name_width - full_name.chars().count()));
        table.push_str("| ");
        table.push_str(&format_local(*created_at));
        table.push_str(" | ");
        table.push_str(&format_local(*updated_at));
        table.push('\n');
    }

    table
}

fn format_local(at: SystemTime) -> String {
    DateTime::<Local>::from(at).format(DATE_FORMAT).to_string()
}
