//! `stratum tables`

use crate::cli::TablesCommand;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{SqliteTableStore, TablePreview, TableStore};
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use std::io::{BufRead, Write};

/// Handle warehouse maintenance commands
///
/// # Errors
///
/// Returns error if the warehouse cannot be opened or a statement fails
pub fn handle_tables(config: &Config, command: TablesCommand) -> Result<()> {
    let store = SqliteTableStore::new(&config.storage.warehouse.path)?;
    let path = store.path().display().to_string();

    match command {
        TablesCommand::List => {
            let tables = store.list_tables()?;
            if tables.is_empty() {
                println!("{}", format!("No tables in {}", path).yellow());
                return Ok(());
            }
            println!("\nTables in {}:", path.cyan());
            for table in tables {
                println!("  {}", table);
            }
            println!();
        }
        TablesCommand::Verify { limit } => {
            let tables = store.list_tables()?;
            if tables.is_empty() {
                println!("{}", format!("No tables in {}", path).yellow());
                return Ok(());
            }
            for table in tables {
                let preview = store.preview(&table, limit)?;
                println!(
                    "\n{} ({} rows)",
                    preview.table.bold(),
                    preview.row_count
                );
                preview_table(&preview).printstd();
            }
            println!();
        }
        TablesCommand::Reset { yes } => {
            let confirmed = yes || {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                confirm(&format!("Drop every table in {}?", path), &mut input)?
            };
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
            let dropped = store.drop_all_tables()?;
            tracing::info!("Dropped {} tables from {}", dropped.len(), path);
            println!(
                "{}",
                format!("Dropped {} tables: {}", dropped.len(), dropped.join(", ")).green()
            );
        }
    }

    Ok(())
}

fn preview_table(preview: &TablePreview) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.set_titles(Row::new(
        preview
            .columns
            .iter()
            .map(|c| Cell::new(c).style_spec("b"))
            .collect(),
    ));
    for row in &preview.rows {
        table.add_row(Row::new(
            row.iter()
                .map(|v| Cell::new(&super::shorten(&super::cell_text(v), 40)))
                .collect(),
        ));
    }
    table
}

/// Asks a yes/no question on stdout and reads the answer from `input`
fn confirm(question: &str, input: &mut impl BufRead) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_confirm_answers() {
        assert!(confirm("drop?", &mut Cursor::new("y\n")).unwrap());
        assert!(confirm("drop?", &mut Cursor::new("YES\n")).unwrap());
        assert!(!confirm("drop?", &mut Cursor::new("\n")).unwrap());
        assert!(!confirm("drop?", &mut Cursor::new("nope\n")).unwrap());
    }

    #[test]
    fn test_preview_table_renders_values() {
        let preview = TablePreview {
            table: "bronze_orders".to_string(),
            row_count: 2,
            columns: vec!["id".to_string(), "amount".to_string()],
            rows: vec![vec![json!(1), json!(9.5)], vec![json!(2), json!(null)]],
        };
        let table = preview_table(&preview);
        assert_eq!(table.len(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("9.5"));
        assert!(rendered.contains("NULL"));
    }

    #[test]
    fn test_reset_with_yes_drops_tables() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.warehouse.path = dir.path().join("warehouse.db");
        let store = SqliteTableStore::new(&config.storage.warehouse.path).unwrap();
        store
            .replace_from_csv("bronze_orders", b"id,amount\n1,9.5\n")
            .unwrap();

        handle_tables(&config, TablesCommand::Verify { limit: 1 }).unwrap();
        handle_tables(&config, TablesCommand::Reset { yes: true }).unwrap();
        assert!(store.list_tables().unwrap().is_empty());
    }
}
