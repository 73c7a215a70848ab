//! `stratum run`

use crate::agent::{
    Agent, JsonlAuditSink, MetricsObserver, RunOutcome, RunStatus, TracingObserver,
};
use crate::config::Config;
use crate::error::{Result, StratumError};
use crate::prompts::build_system_prompt;
use crate::providers::create_provider;
use crate::tools::registry_builder::ToolRegistryBuilder;
use colored::Colorize;
use std::sync::Arc;

/// Builds the agent described by `config`
///
/// The agent gets the configured tool catalog, system prompt, tracing and
/// metrics observers, and the JSON Lines audit sink.
///
/// # Errors
///
/// Returns error if the provider, stores, tool catalog or prompt cannot be
/// initialized
pub fn build_agent(config: &Config) -> Result<Agent> {
    let provider = create_provider(&config.provider)?;
    let tools = ToolRegistryBuilder::from_config(config)?.build()?;
    let prompt = build_system_prompt(
        config.agent.system_prompt_path.as_deref(),
        &config.storage.object_store.bucket,
    )?;

    Ok(Agent::new_boxed(provider, tools, config.agent.clone())?
        .with_system_prompt(prompt)
        .with_observer(Arc::new(TracingObserver::new()))
        .with_observer(Arc::new(MetricsObserver::new()))
        .with_audit_sink(Arc::new(JsonlAuditSink::from_config(&config.audit))))
}

/// Runs the agent against `goal` and prints the outcome
///
/// # Errors
///
/// Returns `StratumError::AgentExecution` when a model call fails, and
/// initialization errors from [`build_agent`]
pub async fn run_goal(config: Config, goal: String, max_steps: Option<usize>) -> Result<()> {
    let budget = max_steps.unwrap_or(config.agent.max_steps);
    if budget == 0 {
        return Err(StratumError::Config("--max-steps must be greater than 0".to_string()).into());
    }

    let agent = build_agent(&config)?;
    tracing::info!(
        "Running goal with {} tools and a budget of {} steps",
        agent.tools().len(),
        budget
    );

    println!("Running goal: {}\n", goal.cyan());
    let outcome = agent.run(goal, budget).await?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome.status {
        RunStatus::Done => {
            println!("{}", "Run complete".green().bold());
            if let Some(answer) = &outcome.final_answer {
                println!("\n{}\n", answer);
            }
        }
        RunStatus::Aborted => {
            let reason = outcome
                .abort_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_default();
            println!("{} {}", "Run aborted:".yellow().bold(), reason);
        }
    }

    println!(
        "run id: {}  status: {}  steps: {}  tool calls: {}  elapsed: {:.1}s",
        outcome.run_id.cyan(),
        outcome.status,
        outcome.steps,
        outcome.tool_call_count(),
        outcome.elapsed.as_secs_f64()
    );

    if let Some(error) = &outcome.audit_error {
        eprintln!("{} {}", "Audit record not written:".red(), error);
    }
}
