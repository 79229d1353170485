//! Output module for run summaries and reports
//!
//! This module handles:
//! - Aggregating frontier records into a run summary
//! - Printing the summary to the terminal
//! - Writing the summary as markdown
//! - Exporting one CSV row per URL

mod markdown;
mod results;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use results::{export_results_csv, write_results_csv};
pub use stats::{
    error_category, load_statistics, print_statistics, ContentStats, CrawlSummary, FailedUrl,
    LevelCounts, RunInfo,
};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
