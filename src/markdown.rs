//! Full Markdown report generation.
//!
//! Renders the un-truncated report used for the file attachment: a results
//! table over every category plus the complete failure text with captured
//! output. Nothing here is size-bounded; the embeds in
//! [`render`](crate::render) handle the chat-message limits.

use crate::render::code_block;
use crate::session::{Category, ReportStore};
use crate::stats::{self, ResultCounts};

/// Renders the complete Markdown report for the file attachment.
///
/// Layout: a `# <header>` title, the results table, then one section per
/// failure with its full representation and any captured output.
pub fn render_report(header: &str, store: &ReportStore, detail: i64) -> String {
    let mut out = format!("# {header}\n{}", render_table(store, detail));

    let failures = render_failure_text(store);
    if !failures.is_empty() {
        out.push_str("\n\n");
        out.push_str(&failures);
    }

    out
}

/// Renders the per-group results table.
///
/// One row per group key (file at detail 0, full test path above that),
/// one column per category, zero counts rendered as empty cells, and a
/// TOTAL row at the bottom.
pub fn render_table(store: &ReportStore, detail: i64) -> String {
    let groups = stats::grouped_counts(store, detail);
    let totals = stats::extract(store);

    let mut rows: Vec<(String, Vec<String>)> = Vec::new();
    for (key, counts) in &groups {
        rows.push((key.clone(), count_cells(counts)));
    }
    rows.push(("TOTAL".to_string(), count_cells(&totals)));

    // Pad every column to its widest cell.
    let mut key_width = "filepath".len();
    let mut widths: Vec<usize> = Category::ALL.iter().map(|c| c.label().len()).collect();
    for (key, cells) in &rows {
        key_width = key_width.max(key.len());
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.len());
        }
    }

    let mut lines = Vec::new();

    let header_cells: Vec<String> = Category::ALL
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:>w$}", c.label(), w = *w))
        .collect();
    lines.push(format!(
        "| {:key_width$} | {} |",
        "filepath",
        header_cells.join(" | ")
    ));

    let rule_cells: Vec<String> = widths.iter().map(|w| format!("{}:", "-".repeat(*w))).collect();
    lines.push(format!(
        "| {} | {} |",
        "-".repeat(key_width),
        rule_cells.join(" | ")
    ));

    for (key, cells) in &rows {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:>w$}", w = *w))
            .collect();
        lines.push(format!("| {key:key_width$} | {} |", padded.join(" | ")));
    }

    lines.join("\n")
}

/// Renders every failure's full representation, with captured output.
fn render_failure_text(store: &ReportStore) -> String {
    let mut sections = Vec::new();

    for category in [Category::Failed, Category::Error] {
        for (i, report) in store.in_category(category).enumerate() {
            let Some(longrepr) = report.longrepr.as_deref() else {
                continue;
            };

            let mut section = format!(
                "# {}: #{}\n{}",
                category.label(),
                i + 1,
                code_block("py", longrepr)
            );
            if !report.capstdout.is_empty() {
                section.push_str("## captured stdout\n");
                section.push_str(&code_block("", &report.capstdout));
            }
            if !report.capstderr.is_empty() {
                section.push_str("## captured stderr\n");
                section.push_str(&code_block("", &report.capstderr));
            }

            sections.push(section);
        }
    }

    sections.join("\n\n")
}

/// A count as a table cell; zeros render as empty.
fn count_cells(counts: &ResultCounts) -> Vec<String> {
    Category::ALL
        .iter()
        .map(|c| {
            let count = counts.get(*c);
            if count == 0 {
                String::new()
            } else {
                count.to_string()
            }
        })
        .collect()
}
