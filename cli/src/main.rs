//! gateway-smoke: run the contract checks against a deployed gateway.
//!
//! Exit status 0 when no check hard-failed (warnings allowed), 1 otherwise.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use smoke_core::config::{default_sites, DEFAULT_BASE_URL, DEFAULT_SID};
use smoke_core::{scenarios, HarnessConfig, Runner, Scenario, Site, UreqTransport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gateway-smoke")]
#[command(about = "Black-box smoke tests for the proxying gateway")]
#[command(version)]
struct Args {
    /// Gateway base URL
    #[arg(long, env = "WORKER_BASE", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Session id sent with every request
    #[arg(long, env = "SID", default_value = DEFAULT_SID)]
    sid: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Pause between scenarios in milliseconds
    #[arg(long, default_value = "50")]
    pause_ms: u64,

    /// Reachability target as label=url (repeatable, replaces the defaults)
    #[arg(long = "site", value_name = "LABEL=URL")]
    sites: Vec<Site>,

    /// Only run scenarios whose name contains this text (repeatable)
    #[arg(long)]
    only: Vec<String>,

    /// List scenario names and exit
    #[arg(long)]
    list: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn select(all: Vec<Scenario>, only: &[String]) -> Vec<Scenario> {
    if only.is_empty() {
        return all;
    }
    let needles: Vec<String> = only.iter().map(|s| s.to_lowercase()).collect();
    all.into_iter()
        .filter(|s| {
            let name = s.name.to_lowercase();
            needles.iter().any(|n| name.contains(n.as_str()))
        })
        .collect()
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    let selected = select(scenarios::all(), &args.only);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.list {
        for scenario in &selected {
            writeln!(out, "{}", scenario.name)?;
        }
        return Ok(ExitCode::SUCCESS);
    }
    if selected.is_empty() {
        writeln!(out, "No scenarios match {:?}", args.only)?;
        return Ok(ExitCode::FAILURE);
    }

    let sites = if args.sites.is_empty() { default_sites() } else { args.sites };
    let config = HarnessConfig::new(&args.base_url, &args.sid)
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_pause(Duration::from_millis(args.pause_ms))
        .with_sites(sites);

    writeln!(out, "Worker base: {}", config.base_url)?;
    writeln!(out, "SID: {}", config.sid)?;

    let transport = UreqTransport::new(config.timeout);
    let summary = Runner::new(&config, &transport)
        .run(&selected, &mut out)
        .context("failed to write report")?;

    Ok(ExitCode::from(summary.exit_code()))
}
