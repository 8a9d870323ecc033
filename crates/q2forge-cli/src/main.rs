//! Q2Forge CLI
//!
//! - `ask`: run the full pipeline for one question
//! - `check-query`: validate raw model output offline (no oracle, no endpoint)
//! - `config`: validate a configuration file and print the effective values

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use q2forge_pipeline::{
    validate_candidate, CancelToken, Pipeline, PipelineConfig, PipelineError, RunContext,
};
use q2forge_sparql::PrefixTable;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser)]
#[command(name = "q2forge")]
#[command(
    author,
    version,
    about = "Q2Forge: judged SPARQL synthesis from natural-language questions"
)]
struct Cli {
    /// Debug-level logs (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question against the configured knowledge graph.
    Ask {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Schema context and example queries for this question (JSON)
        #[arg(long)]
        context: Option<PathBuf>,
        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Skip the question validation gate
        #[arg(long)]
        no_question_check: bool,
        question: String,
    },

    /// Run the query validator on raw model output (`-` reads stdin).
    CheckQuery {
        /// Configuration providing the prefix table; built-in prefixes otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        input: String,
    },

    /// Validate a configuration file and print the effective configuration.
    Config {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "q2forge=debug" } else { "q2forge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr; stdout carries results.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Ask {
            config,
            context,
            json,
            no_question_check,
            question,
        } => cmd_ask(&config, context.as_deref(), json, no_question_check, &question).await,
        Commands::CheckQuery {
            config,
            json,
            input,
        } => cmd_check_query(config.as_deref(), json, &input),
        Commands::Config { config } => cmd_config(&config),
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::load(path).map_err(|e| anyhow!("{e}"))?;
    debug!(path = %path.display(), kg = %config.kg.full_name, "configuration loaded");
    Ok(config)
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(input).with_context(|| format!("failed to read {input}"))
    }
}

async fn cmd_ask(
    config_path: &Path,
    context_path: Option<&Path>,
    json: bool,
    no_question_check: bool,
    question: &str,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if no_question_check {
        config.validate_question = false;
    }
    let context = match context_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            RunContext::from_json_str(&text)
                .map_err(|e| anyhow!("invalid run context {}: {e}", path.display()))?
        }
        None => RunContext::default(),
    };
    info!(
        classes = context.selected_classes.len(),
        examples = context.example_queries.len(),
        "run context loaded"
    );

    let kg_name = config.kg.full_name.clone();
    let pipeline = Pipeline::from_config(config).map_err(|e| anyhow!("{e}"))?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    if !json {
        eprintln!("{} {}", "Asking".green().bold(), kg_name.bold());
    }
    let report = match pipeline.answer_with_cancel(question, context, cancel).await {
        Ok(report) => report,
        Err(PipelineError::Cancelled) => return Err(anyhow!("interrupted")),
        Err(e) => return Err(anyhow!("run failed: {e}")),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render::print_report(&report);
    }
    Ok(())
}

fn cmd_check_query(config_path: Option<&Path>, json: bool, input: &str) -> Result<()> {
    let prefixes = match config_path {
        Some(path) => load_config(path)?.prefixes,
        None => PrefixTable::with_defaults(),
    };
    let raw = read_input(input)?;
    let judgement = validate_candidate(&raw, &prefixes);

    if json {
        println!("{}", serde_json::to_string_pretty(&judgement)?);
    } else {
        render::print_judgement(1, &judgement);
    }
    Ok(())
}

fn cmd_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    eprintln!(
        "{} {}",
        "ok".green().bold(),
        config_path.display().to_string().bold()
    );
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
