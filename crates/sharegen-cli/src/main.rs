//! sharegen - batch Sumsub share-token generator
//!
//! Reads applicant records from CSV, issues one share token per record
//! under the provider's rate limit and writes the results incrementally,
//! with checkpointed resume.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sharegen_core::shutdown::INTERRUPTED_EXIT_CODE;
use sharegen_sumsub::{RunArgs, RunSummary};

mod config;

use config::Config;

/// Exit status for configuration, validation and authentication failures
const FATAL_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "sharegen")]
#[command(about = "Generate Sumsub share tokens for a batch of applicants")]
#[command(version)]
struct Cli {
    /// Input CSV with applicantId, externalId and applicantLevel columns
    input: PathBuf,

    /// Output CSV; the checkpoint is written next to it
    output: PathBuf,

    /// Validate the input and log planned requests without sending them
    #[arg(long)]
    dry_run: bool,

    /// Skip records already completed by a previous run
    #[arg(long)]
    resume: bool,

    /// Requests admitted per rate window (default: 40)
    #[arg(long, value_name = "N")]
    rate_limit: Option<usize>,

    /// Provider base URL (env: SUMSUB_BASE_URL)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Client the tokens are issued for (env: SUMSUB_CLIENT_ID)
    #[arg(long, value_name = "ID")]
    client_id: Option<String>,

    /// Records processed concurrently (default: 1)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Attempts per record before giving up (default: 3)
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Token lifetime in seconds (default: 1814400)
    #[arg(long, value_name = "SECS")]
    ttl: Option<u64>,

    /// Config file path (default: ./sharegen.toml or ~/.config/sharegen/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(sharegen_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug or --dry-run; the bar shows activity
    //   non-TTY: info unless --quiet; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug && !cli.dry_run);
    sharegen_core::init_logging(quiet, cli.debug, multi);

    match try_main(cli, progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

fn try_main(cli: Cli, progress: sharegen_core::SharedProgress) -> anyhow::Result<ExitCode> {
    let file = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let args = resolve(cli, &file, |var| std::env::var(var).ok());
    let config = sharegen_sumsub::Config::try_from(args).context("Configuration error")?;
    sharegen_core::register_secret(&config.credentials.app_token);
    sharegen_core::register_secret(&config.credentials.secret);

    sharegen_core::install_signal_handlers().context("Failed to install signal handlers")?;

    let summary = sharegen_sumsub::run(&config, progress)?;
    Ok(ExitCode::from(exit_code(&summary)))
}

/// Merge CLI flags, environment and config file (in that order of precedence).
fn resolve(cli: Cli, file: &Config, lookup: impl Fn(&str) -> Option<String>) -> RunArgs {
    let env = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    RunArgs {
        input: cli.input,
        output: cli.output,
        app_token: env("SUMSUB_APP_TOKEN").or_else(|| file.provider.app_token.clone()),
        secret: env("SUMSUB_SECRET").or_else(|| file.provider.secret.clone()),
        base_url: cli
            .base_url
            .or_else(|| env("SUMSUB_BASE_URL"))
            .or_else(|| file.provider.base_url.clone()),
        client_id: cli
            .client_id
            .or_else(|| env("SUMSUB_CLIENT_ID"))
            .or_else(|| file.provider.client_id.clone()),
        ttl_secs: cli.ttl.or(file.provider.ttl_secs),
        request_timeout_secs: file.provider.request_timeout_secs,
        rate_limit: cli.rate_limit.or(file.rate_limit.capacity),
        rate_window_secs: file.rate_limit.window_secs,
        max_attempts: cli.max_attempts.or(file.retry.max_attempts),
        base_delay: file.retry.base_delay_ms.map(Duration::from_millis),
        backoff_factor: file.retry.factor,
        max_delay_secs: file.retry.max_delay_secs,
        workers: cli.workers.or(file.run.workers),
        resume: cli.resume,
        dry_run: cli.dry_run,
    }
}

/// 2 on abort, 130 on interrupt, 1 if any record failed, else 0
fn exit_code(summary: &RunSummary) -> u8 {
    if summary.aborted {
        FATAL_EXIT_CODE
    } else if summary.interrupted {
        INTERRUPTED_EXIT_CODE as u8
    } else if summary.failed > 0 {
        1
    } else {
        0
    }
}
