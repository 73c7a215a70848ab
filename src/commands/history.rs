//! `stratum history`

use crate::agent::{JsonlAuditSink, RunRecord, RunStatus};
use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{Result, StratumError};
use crate::providers::Role;
use colored::Colorize;
use prettytable::{format, row, Table};

/// Handle audit trail commands
///
/// # Errors
///
/// Returns error if the audit file cannot be read or the run is not found
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let sink = JsonlAuditSink::from_config(&config.audit);

    match command {
        HistoryCommand::List { limit } => {
            let records = sink.read_all()?;
            if records.is_empty() {
                println!("{}", "No runs recorded yet.".yellow());
                return Ok(());
            }

            println!("\nRun history ({}):", sink.path().display());
            history_table(&records, limit).printstd();
            println!();
            println!(
                "Use {} to see a transcript.",
                "stratum history show <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { run_id } => {
            let record = sink
                .find(&run_id)?
                .ok_or_else(|| StratumError::Audit(format!("no run matches '{}'", run_id)))?;
            print_record(&record);
        }
    }

    Ok(())
}

/// Newest runs first, at most `limit` rows
fn history_table(records: &[RunRecord], limit: usize) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.set_titles(row![b->"ID", b->"Finished", b->"Status", b->"Steps", b->"Goal"]);

    for record in records.iter().rev().take(limit) {
        let id_short: String = record.run_id.chars().take(8).collect();
        let status = match record.status {
            RunStatus::Done => record.status.as_str().green(),
            RunStatus::Aborted => record.status.as_str().red(),
        };
        table.add_row(row![
            id_short.cyan(),
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            status,
            record.steps,
            super::shorten(&record.goal, 50)
        ]);
    }
    table
}

fn print_record(record: &RunRecord) {
    println!("\n{} {}", "Run".bold(), record.run_id.cyan());
    println!("finished: {}", record.timestamp.to_rfc3339());
    println!("goal:     {}", record.goal);
    println!("status:   {}  steps: {}", record.status, record.steps);
    if let Some(reason) = &record.abort_reason {
        println!("reason:   {}", reason);
    }
    println!();

    for message in &record.messages {
        let label = match message.role {
            Role::System => "system".dimmed(),
            Role::User => "user".blue().bold(),
            Role::Assistant => "assistant".green().bold(),
            Role::Tool => "tool".yellow().bold(),
        };
        match (&message.tool_call_id, message.role) {
            (Some(id), _) => println!("[{} {}]", label, id.dimmed()),
            (None, Role::System) => {
                println!("[{}] {}", label, super::shorten(&message.content, 120));
                continue;
            }
            (None, _) => println!("[{}]", label),
        }
        if !message.content.is_empty() {
            println!("{}", message.content);
        }
        for call in &message.tool_calls {
            println!(
                "  -> {}({}) {}",
                call.name.cyan(),
                call.arguments_value(),
                call.id.dimmed()
            );
        }
        println!();
    }

    if let Some(answer) = &record.final_answer {
        println!("{}\n{}\n", "Final answer:".bold(), answer);
    }
}
