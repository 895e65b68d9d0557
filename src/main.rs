//! alertexpr
//!
//! Evaluate an expression request file and print the results as JSON.
//!
//! ```text
//! alertexpr eval request.json --frame A=cpu.csv --pretty
//! ```

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use alertexpr::config::Config;
use alertexpr::executor::{EvaluationRequest, Executor, FailurePolicy};
use alertexpr::frame::read_csv_frame;

#[derive(Parser)]
#[command(name = "alertexpr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate alert expression graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a request and print the results as JSON
    Eval(EvalArgs),
}

#[derive(Args)]
struct EvalArgs {
    /// Request file (JSON with `queries` and optional `frames`)
    request: PathBuf,

    /// Base frame from CSV, as REFID=path (repeatable)
    #[arg(short, long = "frame")]
    frames: Vec<String>,

    /// Config file (default: search the usual locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluate one node at a time
    #[arg(long)]
    sequential: bool,

    /// Failure policy: abort or skip_dependents
    #[arg(long)]
    policy: Option<FailurePolicy>,

    /// Cancel the run after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Eval(args) => eval(args).await,
    }
}

async fn eval(args: EvalArgs) -> anyhow::Result<()> {

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    config.logging.init_tracing()?;

    tracing::debug!("alertexpr v{}", env!("CARGO_PKG_VERSION"));

    let mut engine = config.engine.clone();
    if args.sequential {
        engine.parallel = false;
    }
    if let Some(policy) = args.policy {
        engine.failure_policy = policy;
    }
    if args.timeout_ms.is_some() {
        engine.timeout_ms = args.timeout_ms;
    }

    let request = load_request(&args)?;
    let executor = Executor::new(engine);

    let output = match executor.execute(request).await {
        Ok(results) => {
            let firing: Vec<&str> = results
                .firing
                .iter()
                .filter(|(_, &f)| f)
                .map(|(id, _)| id.as_str())
                .collect();
            tracing::info!(firing = ?firing, "Evaluated {} frames", results.frames.len());
            to_json(&results, args.pretty)?
        }
        Err(failure) => {
            eprintln!("{}", failure);
            println!("{}", to_json(&failure, args.pretty)?);
            std::process::exit(1);
        }
    };

    println!("{}", output);
    Ok(())
}

fn load_request(args: &EvalArgs) -> anyhow::Result<EvaluationRequest> {
    let json = std::fs::read_to_string(&args.request)
        .with_context(|| format!("failed to read request {:?}", args.request))?;
    let mut request = EvaluationRequest::from_json(&json)
        .with_context(|| format!("invalid request {:?}", args.request))?;

    for arg in &args.frames {
        let Some((ref_id, path)) = arg.split_once('=') else {
            bail!("invalid --frame '{}': expected REFID=path", arg);
        };
        let frame = read_csv_frame(ref_id, Path::new(path))
            .with_context(|| format!("failed to load frame for '{}' from {}", ref_id, path))?;
        tracing::debug!(ref_id, rows = frame.row_count(), fields = frame.fields.len(), "Loaded CSV frame");
        request.frames.insert(ref_id.to_string(), frame);
    }

    Ok(request)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}
