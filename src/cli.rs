//! Command-line interface definition for Stratum
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the agent and inspecting its warehouse
//! and audit trail.

use clap::{Parser, Subcommand};

/// Stratum - LLM-directed data pipeline agent
///
/// Hands a natural-language goal to a model that loads object-store CSVs into
/// a layered warehouse using a fixed tool catalog.
#[derive(Parser, Debug, Clone)]
#[command(name = "stratum")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/stratum.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Stratum
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the agent against a goal
    Run {
        /// Natural-language goal for the agent
        #[arg(short, long)]
        goal: String,

        /// Override the configured step budget
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// List the tool catalog exposed to the model
    Tools,

    /// Inspect or reset the warehouse
    Tables {
        /// Warehouse subcommand
        #[command(subcommand)]
        command: TablesCommand,
    },

    /// Browse the audit trail of completed runs
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Warehouse maintenance subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum TablesCommand {
    /// List all tables in the warehouse
    List,

    /// Print row counts and the first rows of every table
    Verify {
        /// Number of rows to preview per table
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },

    /// Drop every table in the warehouse
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Audit trail subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List recorded runs, newest first
    List {
        /// Maximum number of runs to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the full transcript of one run
    Show {
        /// Run identifier (a unique prefix is enough)
        run_id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/stratum.yaml".to_string()),
            verbose: false,
            command: Commands::Tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/stratum.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Tools));
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from([
            "stratum",
            "run",
            "--goal",
            "Sync the demos bucket",
            "--max-steps",
            "12",
        ])
        .unwrap();

        if let Commands::Run { goal, max_steps } = cli.command {
            assert_eq!(goal, "Sync the demos bucket");
            assert_eq!(max_steps, Some(12));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_run_requires_goal() {
        let cli = Cli::try_parse_from(["stratum", "run"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_tables_verify_default_limit() {
        let cli = Cli::try_parse_from(["stratum", "tables", "verify"]).unwrap();
        if let Commands::Tables {
            command: TablesCommand::Verify { limit },
        } = cli.command
        {
            assert_eq!(limit, 5);
        } else {
            panic!("Expected Tables Verify command");
        }
    }

    #[test]
    fn test_cli_parse_tables_reset_yes() {
        let cli = Cli::try_parse_from(["stratum", "tables", "reset", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tables {
                command: TablesCommand::Reset { yes: true }
            }
        ));
    }

    #[test]
    fn test_cli_parse_history_show() {
        let cli = Cli::try_parse_from(["stratum", "history", "show", "4f1c"]).unwrap();
        if let Commands::History {
            command: HistoryCommand::Show { run_id },
        } = cli.command
        {
            assert_eq!(run_id, "4f1c");
        } else {
            panic!("Expected History Show command");
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "stratum",
            "--config",
            "/etc/stratum.yaml",
            "--verbose",
            "tools",
        ])
        .unwrap();
        assert_eq!(cli.config, Some("/etc/stratum.yaml".to_string()));
        assert!(cli.verbose);
    }
}
