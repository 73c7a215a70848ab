//! Command handlers for the CLI
//!
//! - `run`     - run the agent against a goal
//! - `tools`   - print the tool catalog
//! - `tables`  - warehouse maintenance (list, verify, reset)
//! - `history` - browse the audit trail

pub mod history;
pub mod run;
pub mod tables;
pub mod tools;

use serde_json::Value;

/// Renders a warehouse value for a table cell
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shortens `text` to at most `max` characters, marking the cut
pub(crate) fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}
