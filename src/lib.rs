//! Stratum - LLM-directed data pipeline agent library
//!
//! A model is handed a natural-language goal and a fixed catalog of tools
//! over an object store and a SQLite warehouse. The agent loop alternates
//! model turns and tool turns until the model answers or the step budget runs
//! out, reporting each step to observers and recording every run in an
//! append-only audit trail.
//!
//! # Architecture
//!
//! - `agent`: loop state machine, conversation, observers, metrics and audit
//! - `providers`: model provider abstraction and the Ollama implementation
//! - `tools`: tool registry, argument validation and the pipeline tools
//! - `storage`: object store backends (S3, local) and the SQLite warehouse
//! - `prompts`: built-in operating instructions
//! - `config`: configuration loading and validation
//! - `logging`: tracing subscriber setup
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use stratum::Config;
//! use stratum::commands::run::build_agent;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/stratum.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let agent = build_agent(&config)?;
//!     let outcome = agent.run_with_default_budget("Load every CSV in the demos bucket").await?;
//!     println!("{:?}", outcome.final_answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod providers;
pub mod storage;
pub mod tools;

// Re-export commonly used types
pub use agent::{Agent, RunOutcome};
pub use config::Config;
pub use error::{Result, StratumError};

#[cfg(test)]
pub mod test_utils;
