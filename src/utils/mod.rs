//! Utils Module
pub mod json;
pub mod truncate;

pub use json::extract_json;
pub use truncate::{approx_token_count, truncate_chars, truncate_text, TruncationPolicy};
