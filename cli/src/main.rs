//! waspnest CLI - answer a query with a capability pipeline.
//!
//! ```text
//! waspnest [--smart] [--steps N] [--model ID] [--config PATH] <QUERY>...
//! ```
//!
//! Logs go to stderr (filter with `RUST_LOG`); the final state is printed to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use waspnest::pipeline::{Pipeline, Query};
use waspnest::{hooks, report};
use waspnest_config::WaspnestConfig;
use waspnest_engine::{DEFAULT_STEP_LIMIT, RunOptions};
use waspnest_providers::openai::OpenAIClient;
use waspnest_types::{ModelId, State};

#[derive(Parser, Debug)]
#[command(name = "waspnest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Answer a query with a typed capability pipeline", long_about = None)]
struct Cli {
    /// Use the single-step pipeline that adapts the answer to the query's complexity.
    #[arg(long = "smart")]
    smart: bool,

    /// Maximum number of steps.
    #[arg(long = "steps", value_name = "N")]
    steps: Option<usize>,

    /// Model identifier sent to the reasoning service.
    #[arg(long = "model", value_name = "ID")]
    model: Option<String>,

    /// Config file to use instead of ~/.waspnest/config.toml.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(value_name = "QUERY", required = true, num_args = 1..)]
    query: Vec<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WaspnestConfig::load_from(path)?,
        None => WaspnestConfig::load()?,
    }
    .unwrap_or_default();

    let model = match cli.model {
        Some(raw) => ModelId::new(raw)?,
        None => config.model(),
    };
    let api_key = config.openai_api_key().context(
        "no OpenAI API key: set OPENAI_API_KEY or `openai` under [api_keys] in the config file",
    )?;

    let mut builder = OpenAIClient::builder(api_key);
    if let Some(base_url) = config.openai_base_url() {
        builder = builder.base_url(base_url);
    }
    if let Some(timeout) = config.openai_timeout() {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;
    tracing::debug!(endpoint = %client.endpoint(), %model, "Reasoning client ready");

    let pipeline = if cli.smart {
        Pipeline::Smart
    } else {
        Pipeline::Standard
    };
    let orchestrator = pipeline.build(Arc::new(client), model);
    hooks::install(orchestrator.events());

    let step_limit = cli
        .steps
        .or_else(|| config.step_limit())
        .unwrap_or(DEFAULT_STEP_LIMIT);
    let initial = State::new(Query::new(cli.query.join(" ")));
    let finished = orchestrator.run_with(&initial, RunOptions::new().step_limit(step_limit));

    println!("{}", serde_json::to_string_pretty(&report(&finished)?)?);
    Ok(())
}
