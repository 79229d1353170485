//! State module for tracking URL lifecycles
//!
//! # Components
//!
//! - `UrlStatus`: where a URL is in its lifecycle (pending, in progress, completed, failed)
//! - `FetchPath`: which fetch path produced a completed URL's content
//! - `UrlRecord`: the per-URL record kept by the frontier store

mod record;
mod url_status;

pub use record::UrlRecord;
pub use url_status::{FetchPath, UrlStatus};
