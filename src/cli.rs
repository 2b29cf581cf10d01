// src/cli.rs
//! Command line surface.
//!
//! ```bash
//! anbimascraper run-all
//! anbimascraper run idka debentures --force-days 3
//! anbimascraper status --json
//! anbimascraper list
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::{
    ingest::{Ingestor, RunOptions, SourceOutcome},
    sources::{self, SourceAdapter},
};

#[derive(Debug, Parser)]
#[command(name = "anbimascraper")]
#[command(about = "Incremental download of ANBIMA reference data into local CSV datasets")]
#[command(version)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for bases/ and downloads/ (overrides the config file)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args, Clone, Copy, Default)]
pub struct ForceArgs {
    /// Re-fetch the last business days even if already stored
    #[arg(long)]
    pub force: bool,

    /// Number of business days a forced refresh covers (implies --force)
    #[arg(long, value_name = "N")]
    pub force_days: Option<usize>,
}

impl ForceArgs {
    pub fn options(&self, default_days: usize) -> RunOptions {
        match (self.force, self.force_days) {
            (_, Some(n)) => RunOptions::forced(n),
            (true, None) => RunOptions::forced(default_days),
            (false, None) => RunOptions::default(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Update every source
    RunAll {
        #[command(flatten)]
        force: ForceArgs,
    },

    /// Update the named sources
    Run {
        #[arg(required = true, value_name = "SOURCE")]
        sources: Vec<String>,

        #[command(flatten)]
        force: ForceArgs,
    },

    /// Last stored date of each dataset
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Available sources
    List,
}

/// Split requested names into known adapters and unknown names.
pub fn resolve(names: &[String]) -> (Vec<Box<dyn SourceAdapter>>, Vec<String>) {
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        match sources::by_name(name) {
            Some(a) if !adapters.iter().any(|x| x.name() == a.name()) => adapters.push(a),
            Some(_) => {}
            None => unknown.push(name.clone()),
        }
    }
    (adapters, unknown)
}

/// Print one line per source plus the total; true when all succeeded.
pub fn summarize(outcomes: &[SourceOutcome], unknown: &[String]) -> bool {
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => println!("{}", report),
            Err(e) => println!("✗ {}: {}", outcome.source, e),
        }
    }
    for name in unknown {
        println!(
            "✗ {}: unknown source (known: {})",
            name,
            sources::names().join(", ")
        );
    }
    let ok = outcomes.iter().filter(|o| o.succeeded()).count();
    let total = outcomes.len() + unknown.len();
    println!("Total: {}/{} succeeded", ok, total);
    ok == total
}

/// Run a parsed command; the result is the process success flag.
pub async fn execute(
    command: &Commands,
    ingestor: &Ingestor,
    force_days: usize,
    cancel: &CancellationToken,
) -> Result<bool> {
    match command {
        Commands::RunAll { force } => {
            let adapters = sources::all();
            let outcomes = ingestor
                .run_many(&adapters, force.options(force_days), cancel)
                .await;
            Ok(summarize(&outcomes, &[]))
        }
        Commands::Run { sources, force } => {
            let (adapters, unknown) = resolve(sources);
            let outcomes = ingestor
                .run_many(&adapters, force.options(force_days), cancel)
                .await;
            Ok(summarize(&outcomes, &unknown))
        }
        Commands::Status { json } => {
            let status = ingestor.status(&sources::all());
            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                for s in &status {
                    println!("{}", s);
                }
            }
            Ok(status.iter().all(|s| s.error.is_none()))
        }
        Commands::List => {
            for a in sources::all() {
                println!("{:<24} {}", a.name(), a.description());
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_force_days() {
        let cli = Cli::try_parse_from([
            "anbimascraper",
            "--data-dir",
            "/tmp/anbima",
            "run",
            "idka",
            "debentures",
            "--force-days",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/anbima")));
        match cli.command {
            Commands::Run { sources, force } => {
                assert_eq!(sources, vec!["idka", "debentures"]);
                assert_eq!(force.options(6), RunOptions::forced(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_force_uses_configured_window() {
        let cli = Cli::try_parse_from(["anbimascraper", "run-all", "--force"]).unwrap();
        match cli.command {
            Commands::RunAll { force } => assert_eq!(force.options(6), RunOptions::forced(6)),
            other => panic!("unexpected {other:?}"),
        }
        let cli = Cli::try_parse_from(["anbimascraper", "run-all"]).unwrap();
        match cli.command {
            Commands::RunAll { force } => assert_eq!(force.options(6), RunOptions::default()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn run_needs_a_source() {
        assert!(Cli::try_parse_from(["anbimascraper", "run"]).is_err());
    }

    #[test]
    fn unknown_names_are_split_out() {
        let names = vec!["idka".to_string(), "nope".to_string(), "idka".to_string()];
        let (adapters, unknown) = resolve(&names);
        assert_eq!(adapters.len(), 1);
        assert_eq!(unknown, vec!["nope"]);
    }
}
