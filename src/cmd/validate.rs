use crate::config::{ShrinkConfig, TableConfig};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct ValidateSummary {
    valid: bool,
    batch_size: usize,
    seed: Option<u64>,
    tables: Vec<TableSummary>,
}

#[derive(Debug, Serialize)]
struct TableSummary {
    name: String,
    primary_key: Option<String>,
    filters: usize,
    sanitizers: usize,
    rules: usize,
    subtables: Vec<String>,
    locked: bool,
    remove: bool,
}

impl TableSummary {
    fn new(name: &str, table: &TableConfig) -> Self {
        Self {
            name: name.to_string(),
            primary_key: table.options().primary_key.column().map(str::to_string),
            filters: table.filters.len(),
            sanitizers: table.sanitizers.len(),
            rules: table.sanitizers.iter().map(|s| s.rules.len()).sum(),
            subtables: table
                .subtables
                .iter()
                .map(|s| format!("{} ({})", s.table, s.foreign_key))
                .collect(),
            locked: table.lock.is_some(),
            remove: table.remove,
        }
    }
}

pub fn run(config_path: PathBuf, json: bool) -> anyhow::Result<()> {
    if !config_path.exists() {
        anyhow::bail!("config file does not exist: {}", config_path.display());
    }

    let config = ShrinkConfig::load(&config_path)?;
    config.validate()?;

    let summary = ValidateSummary {
        valid: true,
        batch_size: config.batch_size(),
        seed: config.seed,
        tables: config
            .tables
            .iter()
            .map(|(name, table)| TableSummary::new(name, table))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    eprintln!("Configuration: {}", config_path.display());
    eprintln!("  Batch size: {}", summary.batch_size);
    match summary.seed {
        Some(seed) => eprintln!("  Seed: {}", seed),
        None => eprintln!("  Seed: random"),
    }
    eprintln!("  Tables: {}", summary.tables.len());
    eprintln!();

    for table in &summary.tables {
        let key = table.primary_key.as_deref().unwrap_or("none");
        if table.remove {
            eprintln!("  {} [pk: {}] removed", table.name, key);
        } else {
            eprintln!(
                "  {} [pk: {}] {} filters, {} sanitizers ({} rules){}",
                table.name,
                key,
                table.filters,
                table.sanitizers,
                table.rules,
                if table.locked { ", locked rows" } else { "" }
            );
        }
        for subtable in &table.subtables {
            eprintln!("    -> {}", subtable);
        }
    }

    eprintln!();
    eprintln!("Result: VALID");

    Ok(())
}
