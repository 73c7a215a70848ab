//! `stratum tools`

use crate::config::Config;
use crate::error::Result;
use crate::tools::registry_builder::ToolRegistryBuilder;
use crate::tools::ToolRegistry;
use colored::Colorize;
use prettytable::{format, row, Table};

/// Prints the tool catalog the model sees
///
/// # Errors
///
/// Returns error if the stores behind the catalog cannot be initialized
pub fn list_tools(config: &Config) -> Result<()> {
    let registry = ToolRegistryBuilder::from_config(config)?.build()?;
    println!("\n{} ({} tools):", "Tool catalog".bold(), registry.len());
    tools_table(&registry).printstd();
    println!();
    Ok(())
}

fn tools_table(registry: &ToolRegistry) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.set_titles(row![b->"Name", b->"Parameters", b->"Description"]);

    for descriptor in registry.descriptors() {
        let parameters = descriptor
            .parameters
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{}: {}", p.name, marker, p.kind)
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(row![
            descriptor.name.cyan(),
            parameters,
            super::shorten(&descriptor.description, 60)
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalObjectStore, SqliteTableStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_tools_table_lists_every_tool() {
        let dir = TempDir::new().unwrap();
        let registry = ToolRegistryBuilder::new(
            Arc::new(LocalObjectStore::new(dir.path())),
            Arc::new(SqliteTableStore::new(dir.path().join("wh.db")).unwrap()),
            "demos",
        )
        .build()
        .unwrap();

        let table = tools_table(&registry);
        assert_eq!(table.len(), 5);
        let rendered = table.to_string();
        assert!(rendered.contains("load_table"));
        assert!(rendered.contains("bucket?: string"));
        assert!(rendered.contains("key: string"));
    }
}
