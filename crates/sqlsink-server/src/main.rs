//! sqlsink command-line loader
//!
//! Reads messages from stdin, loads them into `SQLite` and writes
//! acknowledged checkpoints to stdout. Logs go to stderr.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlsink_connectors::config::ConnectorConfig;
use sqlsink_connectors::sqlite::sqlite_sink_config_keys;
use sqlsink_connectors::{Pipeline, SqliteSinkConfig, SqliteStore};

/// sqlsink - load a SCHEMA/RECORD/STATE message stream into `SQLite`
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (JSON object)
    #[arg(short, long)]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sqlsink={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for line in format!("{e:#}").lines() {
                error!("{line}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), config = %args.config.display(), "starting sqlsink");

    let config = load_config(&args.config)?;
    let store = SqliteStore::open(&config)
        .with_context(|| format!("opening database {}", config.database_path().display()))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut pipeline = Pipeline::new(&config, store, stdout.lock());
    let metrics = pipeline.run(stdin.lock())?;

    info!(%metrics, "load complete");
    Ok(())
}

/// Reads the JSON config file and builds the sink configuration.
fn load_config(path: &Path) -> Result<SqliteSinkConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    let config = ConnectorConfig::from_json("sqlite", &value)?;

    let missing = config.missing_keys(&sqlite_sink_config_keys());
    if !missing.is_empty() {
        bail!(
            "{} config file is missing required keys: {}",
            config.connector_type(),
            missing.join(", ")
        );
    }
    Ok(SqliteSinkConfig::from_config(&config)?)
}
