//! Formatting helpers shared by the CLI output.

pub mod format;

pub use format::{format_count, format_hours, truncate_string};
