//! Output formatting for CLI.

mod json;
mod text;

pub use json::{CookieReport, JsonFormatter, OutcomeOutput, RecordsOutput, StatusReport, TokenOutput};
pub use text::TextFormatter;
