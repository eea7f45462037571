//! Session index generation
//!
//! This module renders the session summary as a Markdown index at the root of
//! the export, next to a machine-readable `session.json`.

use crate::output::paths::relative_link;
use crate::output::summary::SessionSummary;
use crate::output::writer::write_atomic;
use crate::output::OutputResult;
use std::path::Path;

/// Name of the machine-readable summary file
pub const SESSION_JSON: &str = "session.json";

/// Writes the Markdown index and `session.json` under the output root
///
/// # Arguments
///
/// * `root` - Output root directory
/// * `index_file` - Index file name (e.g. "SUMMARY.md")
/// * `summary` - The session summary
///
/// # Returns
///
/// * `Ok(())` - Both files written
/// * `Err(OutputError)` - A write failed; already exported pages are untouched
pub fn write_index(root: &Path, index_file: &str, summary: &SessionSummary) -> OutputResult<()> {
    let markdown = format_index(summary, index_file);
    write_atomic(&root.join(index_file), markdown.as_bytes())?;

    let json = serde_json::to_vec_pretty(summary)?;
    write_atomic(&root.join(SESSION_JSON), &json)?;

    Ok(())
}

/// Formats a session summary as Markdown
///
/// Page links are relative to `index_file`, which lives at the output root.
pub fn format_index(summary: &SessionSummary, index_file: &str) -> String {
    let mut md = String::new();

    md.push_str("# Export Summary\n\n");

    md.push_str("## Session\n\n");
    md.push_str(&format!("- **Session ID**: {}\n", summary.session_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.duration_secs
    ));
    md.push_str(&format!(
        "- **Termination**: {}\n\n",
        summary.termination.as_str()
    ));

    let c = &summary.counters;
    md.push_str("## Counters\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Fetched | {} |\n", c.fetched));
    md.push_str(&format!("| Exported | {} |\n", c.exported));
    md.push_str(&format!("| Unchanged | {} |\n", c.unchanged));
    md.push_str(&format!("| Not modified | {} |\n", c.not_modified));
    md.push_str(&format!("| Aliased | {} |\n", c.aliased));
    md.push_str(&format!("| Robots denied | {} |\n", c.robots_denied));
    md.push_str(&format!("| Failed | {} |\n", c.failed));
    md.push_str(&format!("| Assets stored | {} |\n", c.assets_stored));
    md.push_str(&format!("| Bytes fetched | {} |\n\n", c.bytes_fetched));

    if !summary.pages.is_empty() {
        md.push_str("## Pages\n\n");
        md.push_str("| Page | Title | Status |\n");
        md.push_str("|------|-------|--------|\n");
        for page in &summary.pages {
            md.push_str(&format!(
                "| [{}]({}) | {} | {} |\n",
                escape_cell(&page.path),
                relative_link(index_file, &page.path),
                escape_cell(page.title.as_deref().unwrap_or("Untitled")),
                page.status
            ));
        }
        md.push('\n');
    }

    if !summary.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | Reason | Detail |\n");
        md.push_str("|-----|--------|--------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&failure.url),
                failure.reason,
                escape_cell(&failure.detail)
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}
