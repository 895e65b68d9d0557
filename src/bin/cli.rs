//! alertexpr CLI
//!
//! Inspection tools for expression graphs:
//! - Show evaluation order and levels
//! - Validate a node set without evaluating it
//! - Impact analysis for a node
//! - List reducers
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use alertexpr::executor::{EvaluationRequest, Plan};
use alertexpr::reducer::ReducerRegistry;

#[derive(Parser)]
#[command(name = "alertexpr-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and validate alert expression graphs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the evaluation order of a request
    Graph {
        /// Request file
        request: PathBuf,
    },

    /// Validate a request without evaluating it
    Validate {
        /// Request file
        request: PathBuf,
    },

    /// Show what a node depends on and what depends on it
    Impact {
        /// Request file
        request: PathBuf,
        /// Node RefID
        ref_id: String,
    },

    /// List available reducers
    Reducers,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = cli.format == "json";

    match cli.command {
        Commands::Graph { request } => {
            let plan = load_plan(&request)?;
            let schedule = plan.schedule();

            if json {
                println!("{}", serde_json::to_string_pretty(schedule)?);
                return Ok(());
            }

            println!("{:<4} {:<12} {:<10} {:<6} {}", "#", "RefID", "Type", "Level", "Reads");
            println!("{}", "-".repeat(50));

            for (i, ref_id) in schedule.order().iter().enumerate() {
                let Some(node) = plan.node(ref_id) else { continue };
                let level = schedule
                    .levels()
                    .iter()
                    .position(|l| l.contains(ref_id))
                    .unwrap_or(0);
                let reads: Vec<&str> = node.references().iter().map(String::as_str).collect();
                println!(
                    "{:<4} {:<12} {:<10} {:<6} {}",
                    i + 1,
                    ref_id,
                    node.query_type(),
                    level,
                    if reads.is_empty() { "-".to_string() } else { reads.join(", ") }
                );
            }

            println!();
            println!(
                "{} nodes in {} levels",
                schedule.len(),
                schedule.levels().len()
            );
        }

        Commands::Validate { request } => match load_plan(&request) {
            Ok(plan) => {
                let base = plan.nodes().iter().filter(|n| n.is_base()).count();
                println!(
                    "OK: {} nodes ({} base, {} expressions)",
                    plan.nodes().len(),
                    base,
                    plan.nodes().len() - base
                );
            }
            Err(e) => {
                eprintln!("Invalid: {:#}", e);
                std::process::exit(1);
            }
        },

        Commands::Impact { request, ref_id } => {
            let plan = load_plan(&request)?;
            let graph = plan.graph();

            if !graph.contains(&ref_id) {
                eprintln!("No node '{}' in {:?}", ref_id, request);
                std::process::exit(1);
            }

            let upstream = graph.upstream_of(&[ref_id.as_str()]);
            let downstream = graph.downstream_of(&[ref_id.as_str()]);

            if json {
                let body = serde_json::json!({
                    "refId": ref_id,
                    "upstream": upstream,
                    "downstream": downstream,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{}", ref_id);
                println!("  reads:       {}", join_or_dash(&upstream));
                println!("  affects:     {}", join_or_dash(&downstream));
            }
        }

        Commands::Reducers => {
            let registry = ReducerRegistry::default();
            for id in registry.ids() {
                println!("{}", id);
            }
        }

        Commands::Config { output } => {
            let config = alertexpr::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    let request = EvaluationRequest::from_json(&json).with_context(|| format!("invalid request {:?}", path))?;
    Ok(Plan::build(request.queries)?)
}

fn join_or_dash(ids: &std::collections::BTreeSet<String>) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
