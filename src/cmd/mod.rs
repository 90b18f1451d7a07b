mod shrink;
mod validate;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

pub use shrink::ShrinkArgs;

#[derive(Parser)]
#[command(name = "dbshrink")]
#[command(version)]
#[command(about = "Shrink and sanitize a database into a small, privacy-safe copy", long_about = None)]
pub struct Cli {
    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Filter, cascade and sanitize the tables of a DuckDB database in place
    Shrink(ShrinkArgs),

    /// Check a configuration file without touching any database
    Validate {
        /// YAML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Shrink(args) => shrink::run(args),
        Commands::Validate { config, json } => validate::run(config, json),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "dbshrink", &mut io::stdout());
            Ok(())
        }
    }
}

/// Split a comma-separated list, dropping empty entries
pub(crate) fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
