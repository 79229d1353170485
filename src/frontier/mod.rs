//! The frontier: every URL the run knows about and the order it is dispatched in
//!
//! The [`FrontierStore`] owns one [`UrlRecord`](crate::state::UrlRecord) per
//! distinct URL and a FIFO queue of pending URLs. All lifecycle transitions go
//! through its methods, which take the internal lock for the whole transition,
//! so two callers can never claim the same URL.

mod snapshot;
mod store;

pub use snapshot::FrontierSnapshot;
pub use store::FrontierStore;

use crate::state::UrlStatus;
use thiserror::Error;

/// Errors raised by frontier transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("URL not in frontier: {0}")]
    UnknownUrl(String),

    #[error("Invalid transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: UrlStatus,
        to: UrlStatus,
    },
}

/// Result type for frontier operations
pub type StoreResult<T> = Result<T, StoreError>;
