//! System prompts for the pipeline agent
//!
//! The agent runs with built-in operating instructions unless the
//! configuration points at a prompt file.

pub mod pipeline_prompt;

use crate::error::{Result, StratumError};
use std::path::Path;

/// Builds the system prompt for a run
///
/// Reads `override_path` when given, otherwise returns the built-in prompt
/// for `default_bucket`.
///
/// # Errors
///
/// Returns `StratumError::Config` if the override file cannot be read or is empty
///
/// # Examples
///
/// ```
/// use stratum::prompts::build_system_prompt;
///
/// let prompt = build_system_prompt(None, "demos").unwrap();
/// assert!(prompt.contains("BRONZE"));
/// ```
pub fn build_system_prompt(override_path: Option<&Path>, default_bucket: &str) -> Result<String> {
    let Some(path) = override_path else {
        return Ok(pipeline_prompt::generate_pipeline_prompt(default_bucket));
    };

    let contents = std::fs::read_to_string(path).map_err(|e| {
        StratumError::Config(format!(
            "Failed to read system prompt {}: {}",
            path.display(),
            e
        ))
    })?;

    if contents.trim().is_empty() {
        return Err(StratumError::Config(format!(
            "System prompt file {} is empty",
            path.display()
        ))
        .into());
    }

    tracing::debug!("Loaded system prompt from {}", path.display());
    Ok(contents)
}
