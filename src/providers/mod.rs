//! Provider module for Stratum
//!
//! This module contains the model provider abstraction and the Ollama
//! implementation.

pub mod base;
pub mod ollama;

pub use base::{CompletionResponse, Message, Provider, Role, TokenUsage, ToolCall};
pub use ollama::OllamaProvider;

use crate::config::ProviderConfig;
use crate::error::{Result, StratumError};

/// Create a provider instance based on configuration
///
/// # Errors
///
/// Returns error if the provider type is unknown or initialization fails
///
/// # Examples
///
/// ```
/// use stratum::config::{OllamaConfig, ProviderConfig};
/// use stratum::providers::create_provider;
///
/// let config = ProviderConfig {
///     provider_type: "ollama".to_string(),
///     ollama: OllamaConfig::default(),
/// };
/// assert!(create_provider(&config).is_ok());
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    match config.provider_type.as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::new(config.ollama.clone())?)),
        other => Err(StratumError::Provider(format!("Unknown provider type: {}", other)).into()),
    }
}
