// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotsync::{
    clock::{Clock, SystemClock},
    path::default_config_file,
    sync::{DomainState, StatusReport},
    SyncConfig, SyncManager,
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    io::{stderr, stdin, IsTerminal},
    path::PathBuf,
    process::exit,
};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotsync [options] <dotsync-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = "DOTSYNC_CONFIG", value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = self.config;
        match self.command {
            Command::Run(opts) => run_pass(config, opts),
            Command::Status => run_status(config),
            Command::ClearFailures => run_clear_failures(config),
            Command::Reset => run_reset(config),
            Command::Init(opts) => run_init(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check sync domains for drift, at most once per interval.
    #[command(override_usage = "dotsync run [options]")]
    Run(RunOptions),

    /// Show sync state without touching the network.
    #[command(override_usage = "dotsync status [options]")]
    Status,

    /// Clear failure ledger, re-enabling sync after circuit breaker trips.
    #[command(override_usage = "dotsync clear-failures [options]")]
    ClearFailures,

    /// Forget last check, so the next prompt checks right away.
    #[command(override_usage = "dotsync reset [options]")]
    Reset,

    /// Print shell snippet that runs dotsync before every prompt.
    #[command(override_usage = "dotsync init [options] <shell>")]
    Init(InitOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Check even if the interval has not elapsed yet.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Shell to print prompt hook for.
    #[arg(required = true, value_name = "shell")]
    pub shell: Shell,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Shell {
    Zsh,
    Bash,
}

const ZSH_HOOK: &str = r#"_dotsync_precmd() {
  command dotsync run
}
autoload -Uz add-zsh-hook
add-zsh-hook precmd _dotsync_precmd
"#;

const BASH_HOOK: &str = r#"_dotsync_prompt_command() {
  command dotsync run
}
if [[ ";${PROMPT_COMMAND:-};" != *";_dotsync_prompt_command;"* ]]; then
  PROMPT_COMMAND="_dotsync_prompt_command${PROMPT_COMMAND:+;$PROMPT_COMMAND}"
fi
"#;

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn load_config(path: Option<PathBuf>) -> Result<SyncConfig> {
    let path = match path {
        Some(path) => path,
        None => default_config_file()?,
    };

    Ok(SyncConfig::load(path)?)
}

fn run_pass(config: Option<PathBuf>, opts: RunOptions) -> Result<()> {
    // INVARIANT: Never prompt without a terminal to answer from.
    if !stdin().is_terminal() {
        return Ok(());
    }

    // INVARIANT: Never fail the calling shell over a broken setup.
    let config = match load_config(config) {
        Ok(config) => config,
        Err(error) => {
            warn!("sync skipped: {error:#}");
            return Ok(());
        }
    };

    let mut manager = SyncManager::from_config(config);
    if opts.force {
        manager.force_pass();
    } else {
        manager.run_pass();
    }

    Ok(())
}

fn run_status(config: Option<PathBuf>) -> Result<()> {
    let manager = SyncManager::from_config(load_config(config)?);
    print_status(&manager.status_report(), SystemClock.now());

    Ok(())
}

fn run_clear_failures(config: Option<PathBuf>) -> Result<()> {
    let manager = SyncManager::from_config(load_config(config)?);
    manager.clear_failures()?;

    Ok(())
}

fn run_reset(config: Option<PathBuf>) -> Result<()> {
    let manager = SyncManager::from_config(load_config(config)?);
    manager.reset_interval()?;

    Ok(())
}

fn run_init(opts: InitOptions) -> Result<()> {
    match opts.shell {
        Shell::Zsh => print!("{ZSH_HOOK}"),
        Shell::Bash => print!("{BASH_HOOK}"),
    }

    Ok(())
}

fn print_status(report: &StatusReport, now: i64) {
    if report.disabled {
        println!("sync: disabled through environment");
    }

    match report.last_checked {
        Some(epoch) => println!("last check: {}", relative(epoch, now)),
        None => println!("last check: never"),
    }

    match report.next_due {
        Some(epoch) if epoch > now => println!("next check: {}", relative(epoch, now)),
        _ => println!("next check: at next prompt"),
    }

    match &report.breaker {
        Some(marker) => println!(
            "breaker: open since {}, run `dotsync clear-failures` to re-enable",
            relative(marker.at(), now)
        ),
        None => println!("breaker: closed"),
    }

    for failure in &report.failures {
        println!("  failure {}: {failure}", relative(failure.at(), now));
    }

    for domain in &report.domains {
        let state = match &domain.state {
            DomainState::NotARepository => "not a repository".to_string(),
            DomainState::Unreadable(error) => format!("unreadable: {error}"),
            DomainState::Snapshot(snapshot) => format!(
                "{}, {} behind, {} ahead",
                if snapshot.has_uncommitted_changes {
                    "uncommitted changes"
                } else {
                    "clean"
                },
                snapshot.commits_behind_remote,
                snapshot.commits_ahead_of_remote,
            ),
        };
        let disabled = if domain.disabled { " (disabled)" } else { "" };
        println!(
            "{}{disabled}: {:?} tracking {}: {state}",
            domain.name,
            domain.path.display(),
            domain.upstream,
        );
    }
}

fn relative(epoch: i64, now: i64) -> String {
    let delta = epoch.saturating_sub(now);
    let secs = delta.unsigned_abs();
    let amount = if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    };

    if delta > 0 {
        format!("in {amount}")
    } else {
        format!("{amount} ago")
    }
}
