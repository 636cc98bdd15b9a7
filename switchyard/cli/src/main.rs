//! Switchyard - Routing Simulator
//!
//! Runs a batch of requests through a strategy table against the scripted
//! backend, so retry, fallback and circuit-breaker behaviour can be observed
//! without a real model server.
//!
//! # Usage
//!
//! ```bash
//! # Built-in demo table, primary always unavailable
//! switchyard --fail primary=unavailable
//!
//! # Table from a file, first two calls to gpt-large time out
//! switchyard --config routes.toml --fail gpt-large=deadline_exceeded:2
//!
//! # Machine-readable reports
//! switchyard --requests 50 --concurrency 8 --json
//!
//! # Verbose routing logs
//! RUST_LOG=switchyard_core=debug switchyard
//! ```

mod simulate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use switchyard_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use tracing::info;

use simulate::{FailureSpec, Simulation};

/// Switchyard - simulate resilient routing across ranked strategies
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Routes file (defaults to ~/.config/switchyard/routes.toml)
    #[arg(short = 'c', long, env = "SWITCHYARD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of requests to route
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: usize,

    /// Requests in flight at once
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,

    /// Script failures for a target; without COUNT every call fails
    #[arg(long = "fail", value_name = "TARGET=KIND[:COUNT]")]
    failures: Vec<FailureSpec>,

    /// Mark a target unavailable for the whole run
    #[arg(long = "down", value_name = "TARGET")]
    down: Vec<String>,

    /// Override the logical name
    #[arg(long, value_name = "NAME")]
    logical_name: Option<String>,

    /// Override the default error cooldown
    #[arg(long, value_name = "MS")]
    cooldown_ms: Option<u64>,

    /// Override the default disable threshold
    #[arg(long, value_name = "N")]
    min_errors_to_disable: Option<u32>,

    /// Override the default attempts for strategies without retry rules
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Print reports and summary as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SWITCHYARD_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(name) = &self.logical_name {
            overrides = overrides.with_logical_name(name.clone());
        }
        if let Some(ms) = self.cooldown_ms {
            overrides = overrides.with_default_cooldown_ms(ms);
        }
        if let Some(count) = self.min_errors_to_disable {
            overrides = overrides.with_default_min_errors_to_disable(count);
        }
        if let Some(attempts) = self.max_attempts {
            overrides = overrides.with_default_max_attempts(attempts);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("switchyard={level},switchyard_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Switchyard simulator starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let explicit_config = args.config.is_some();
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path.clone()).with_context(|| {
        format!(
            "Failed to load routes from {}",
            config_path
                .as_deref()
                .map_or_else(|| "<none>".to_string(), |p| p.display().to_string())
        )
    })?;
    args.overrides().apply(&mut config);

    let table = if config.strategies.is_empty() && !explicit_config {
        info!("No routes file found, using the built-in demo table");
        simulate::demo_table(&config.logical_name)?
    } else {
        config
            .strategy_table()
            .context("Routes file does not describe a usable strategy table")?
    };

    info!(
        logical_name = %table.logical_name(),
        strategies = ?table.ids(),
        source = %config.source(),
        "Strategy table ready"
    );

    let simulation = Simulation::new(table, args.json);
    simulation.script(&args.failures, &args.down);
    let summary = simulation.run(args.requests, args.concurrency.max(1)).await;
    simulation.print_summary(&summary)?;

    Ok(())
}
