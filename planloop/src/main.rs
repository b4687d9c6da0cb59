//! Goal-driven agent orchestration CLI.
//!
//! `planloop run` asks the configured model for one action at a time,
//! dispatches tasks to an in-process substrate, and prints the run log
//! followed by the final result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use planloop::agent::{Agent, AgentOptions};
use planloop::core::log::{LogEntry, LogSink};
use planloop::exit_codes;
use planloop::io::config::{AgentConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use planloop::io::llm::HttpLlmClient;
use planloop::io::substrate::LocalSubstrate;
use planloop::logging;
use planloop::record::run_recorded;
use planloop::tasks::TaskCatalog;

#[derive(Parser)]
#[command(
    name = "planloop",
    version,
    about = "Goal-driven agent loop over a task catalog"
)]
struct Cli {
    /// Raise tracing verbosity on stderr (`-v` info, `-vv` debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent until the model finishes or the run aborts.
    Run {
        /// Natural-language goal for the agent.
        goal: String,
        /// JSON value passed to the model alongside the goal.
        #[arg(long, default_value = "{}")]
        context: String,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Print the run record as JSON instead of log lines.
        #[arg(long)]
        json: bool,
    },
    /// List the tasks offered to the model.
    Tasks {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            goal,
            context,
            config,
            json,
        } => cmd_run(&goal, &context, &config, json),
        Command::Tasks { config } => cmd_tasks(&config),
        Command::Init { force, config } => cmd_init(&config, force),
    }
}

fn cmd_run(goal: &str, context: &str, config_path: &Path, json: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let context: Value = serde_json::from_str(context).context("parse --context as JSON")?;
    let catalog = TaskCatalog::from_config(&config)?;

    let api_key = config.api_key();
    if api_key.is_none() {
        warn!(
            env = %config.llm.api_key_env,
            "no API key set; sending unauthenticated requests"
        );
    }
    let llm = HttpLlmClient::new(&config.llm, api_key)?;
    let agent = Agent::new(llm, LocalSubstrate::new(), catalog).with_options(AgentOptions {
        max_malformed_responses: config.max_malformed_responses,
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;

    let record = if json {
        let mut quiet = |_: &LogEntry| -> Result<()> { Ok(()) };
        runtime.block_on(run_recorded(&agent, goal, &context, &mut quiet))
    } else {
        let mut printer = StdoutSink;
        runtime.block_on(run_recorded(&agent, goal, &context, &mut printer))
    };
    info!(run_id = %record.id, succeeded = record.succeeded(), "run recorded");

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("serialize run record")?
        );
    } else if let Some(error) = &record.error {
        eprintln!("error: {error}");
    } else {
        println!("{}", record.output);
    }

    Ok(if record.succeeded() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_tasks(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let catalog = TaskCatalog::from_config(&config)?;
    for task in catalog.descriptions() {
        println!("{}: {}", task.name, task.description);
    }
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &AgentConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

/// Prints each run log entry as `[type] message`.
struct StdoutSink;

impl LogSink for StdoutSink {
    fn log(&mut self, entry: &LogEntry) -> Result<()> {
        println!("[{}] {}", entry.kind.as_str(), entry.message);
        Ok(())
    }
}
