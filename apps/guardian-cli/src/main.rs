//! # guardian
//!
//! Command-line interface for the Subscription Guardian policy engine.
//!
//! - `guardian check` — validate the configured ruleset and list its rules
//! - `guardian evaluate` — decide one action request, print the verdict
//! - `guardian audit list/verify` — inspect the tamper-evident decision log
//!
//! Exit status: 0 when the evaluated action is allowed, 2 when it is blocked,
//! 1 on any error (bad config, rejected ruleset, malformed request).

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Subscription Guardian: binding ALLOW/BLOCK decisions for agent actions.
#[derive(Parser)]
#[command(name = "guardian", version, about)]
struct Cli {
    /// Path to guardian.toml.
    #[arg(long, global = true, default_value = "guardian.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the ruleset and print the rules that would be active.
    Check,
    /// Evaluate one action request (JSON) and print the verdict.
    Evaluate {
        /// Request file, or "-" for stdin.
        #[arg(long, default_value = "-")]
        request: String,
        /// Print the full evaluation trace instead of just the verdict.
        #[arg(long)]
        trace: bool,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("guardian_policy=warn".parse()?)
                .add_directive("guardian_audit=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Check => commands::check::execute(&cli.config),
        Commands::Evaluate { request, trace } => {
            commands::evaluate::execute(&cli.config, request, *trace)
        }
        Commands::Audit { command } => commands::audit::execute(command, &cli.config),
    }
}
