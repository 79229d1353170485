//! Markdown summary generation
//!
//! This module renders a [`CrawlSummary`] as a human-readable markdown report.

use crate::output::stats::CrawlSummary;
use crate::output::OutputResult;
use crate::state::UrlStatus;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary to `output_path`
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Frontier-Relay Crawl Summary\n\n");

    if let Some(run) = &summary.run {
        md.push_str("## Run Information\n\n");
        md.push_str(&format!("- **Run ID**: {}\n", run.id));
        md.push_str(&format!("- **Started**: {}\n", run.started_at));
        if let Some(finished) = &run.finished_at {
            md.push_str(&format!("- **Finished**: {}\n", finished));
        }
        md.push_str(&format!("- **Status**: {}\n", run.status));
        md.push_str(&format!("- **Config Hash**: {}\n\n", run.config_hash));
    }

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Total URLs**: {}\n", summary.total));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        summary.success_rate()
    ));
    md.push_str(&format!("- **Unfinished**: {}\n\n", summary.unfinished()));

    md.push_str("## Status Breakdown\n\n");
    md.push_str("| Status | Count |\n");
    md.push_str("|--------|-------|\n");
    for status in UrlStatus::all() {
        md.push_str(&format!("| {} | {} |\n", status, summary.count(status)));
    }
    md.push('\n');

    if !summary.by_level.is_empty() {
        md.push_str("## Level Breakdown\n\n");
        md.push_str("| Level | URLs | Completed | Failed |\n");
        md.push_str("|-------|------|-----------|--------|\n");
        for (level, counts) in &summary.by_level {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                level, counts.total, counts.completed, counts.failed
            ));
        }
        md.push('\n');
    }

    md.push_str("## Fetch Paths\n\n");
    md.push_str(&format!("- **Local**: {}\n", summary.fetched_local));
    md.push_str(&format!("- **Remote (escalated)**: {}\n", summary.escalated));
    md.push_str(&format!(
        "- **Local after failed escalation**: {}\n\n",
        summary.degraded
    ));

    if summary.content.pages > 0 {
        md.push_str("## Content Size\n\n");
        md.push_str(&format!("- **Pages**: {}\n", summary.content.pages));
        md.push_str(&format!(
            "- **Total**: {} bytes\n",
            summary.content.total_bytes
        ));
        md.push_str(&format!(
            "- **Average**: {:.0} bytes\n",
            summary.content.average_bytes()
        ));
        md.push_str(&format!(
            "- **Min / Max**: {} / {} bytes\n\n",
            summary.content.min_bytes, summary.content.max_bytes
        ));
    }

    if !summary.errors_by_category.is_empty() {
        md.push_str("## Errors by Category\n\n");
        md.push_str("| Category | Count |\n");
        md.push_str("|----------|-------|\n");
        for (category, count) in &summary.errors_by_category {
            md.push_str(&format!("| {} | {} |\n", category, count));
        }
        md.push('\n');
    }

    if !summary.failures.is_empty() {
        md.push_str("## Failed URLs\n\n");
        md.push_str("| URL | Level | Attempts | Last Error |\n");
        md.push_str("|-----|-------|----------|------------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                failure.url,
                failure.level,
                failure.attempts,
                escape_cell(failure.last_error.as_deref().unwrap_or(""))
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
