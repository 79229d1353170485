//! Per-URL results export
//!
//! Writes one CSV row per frontier record, in discovery order.

use crate::output::OutputResult;
use crate::state::UrlRecord;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    url: &'a str,
    status: &'static str,
    level: u32,
    attempts: u32,
    started_at: Option<String>,
    finished_at: Option<String>,
    fetched_via: Option<&'static str>,
    content_digest: Option<&'a str>,
    content_len: Option<u64>,
    artifact_ref: Option<&'a str>,
    last_error: Option<&'a str>,
    parent_url: Option<&'a str>,
}

impl<'a> From<&'a UrlRecord> for ResultRow<'a> {
    fn from(record: &'a UrlRecord) -> Self {
        Self {
            url: &record.url,
            status: record.status.to_db_string(),
            level: record.level,
            attempts: record.attempt_count,
            started_at: record.started_at.map(|t| t.to_rfc3339()),
            finished_at: record.finished_at.map(|t| t.to_rfc3339()),
            fetched_via: record.fetched_via.map(|p| p.to_db_string()),
            content_digest: record.content_digest.as_deref(),
            content_len: record.content_len,
            artifact_ref: record.artifact_ref.as_deref(),
            last_error: record.last_error.as_deref(),
            parent_url: record.parent_url.as_deref(),
        }
    }
}

/// Writes records as CSV with a header row
pub fn write_results_csv<W: Write>(records: &[UrlRecord], out: W) -> OutputResult<()> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer.serialize(ResultRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the CSV export to `output_path`, creating parent directories
pub fn export_results_csv(records: &[UrlRecord], output_path: &Path) -> OutputResult<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(output_path)?;
    write_results_csv(records, file)
}
