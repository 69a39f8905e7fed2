//! Output formatting for CLI.

mod json;
mod text;

pub use json::{JsonFormatter, SnapshotOutput};
pub use text::{TextFormatter, format_age};
#[cfg(test)]
mod tests;
