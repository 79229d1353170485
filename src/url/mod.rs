//! URL handling module for Frontier-Relay
//!
//! This module provides the basic normalization that turns seed URLs and
//! discovered links into frontier keys.

mod normalize;

pub use normalize::{normalize_link, normalize_url};
