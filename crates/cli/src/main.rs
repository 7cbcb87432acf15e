// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `palhm` — periodic automatic live host maintenance.

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use palhm_core::{DEFAULT_TASK, DEFAULT_VL};
use palhm_engine::Engine;

const DEFAULT_CONFIG: &str = "/etc/palhm/palhm.jsonc";

#[derive(Parser)]
#[command(name = "palhm", version, about = "Host maintenance and backup orchestrator")]
struct Cli {
    /// Set the verbosity level to errors only. Overrides config
    #[arg(short = 'q', conflicts_with = "verbose")]
    quiet: bool,

    /// Increase the verbosity level by 1. Overrides config
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Load config from FILE instead of the hard-coded default
    #[arg(short = 'f', value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task from config
    Run {
        /// Task id; the "default" task when omitted
        task: Option<String>,
    },
    /// Load and validate config, print the assembled context
    Config,
    /// List the available extension modules
    Mods,
    /// Compose and send the boot report
    BootReport,
}

/// CLI flags override the configured verbosity: `-q` drops to errors
/// only, each `-v` raises one step above the built-in default.
fn effective_vl(quiet: bool, verbose: u8, configured: Option<i64>) -> i64 {
    if quiet {
        1
    } else if verbose > 0 {
        DEFAULT_VL + verbose as i64
    } else {
        configured.unwrap_or(DEFAULT_VL)
    }
}

fn init_tracing(vl: i64) {
    let level = match vl {
        i64::MIN..=1 => tracing::Level::ERROR,
        2 => tracing::Level::WARN,
        3 => tracing::Level::INFO,
        4 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    if let Command::Mods = cli.command {
        for module in palhm_adapters::available_modules() {
            println!("{}", module);
        }
        return Ok(0);
    }

    let mut doc = palhm_config::load_document(&cli.config)?;
    doc.vl = Some(effective_vl(cli.quiet, cli.verbose, doc.vl));
    init_tracing(doc.vl.unwrap_or(DEFAULT_VL));

    let engine = Engine::from_config(&doc)?;
    match cli.command {
        Command::Run { task } => {
            // an empty string also selects the default task
            let task = task
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TASK.to_string());
            engine.run_task(&task).await?;
            Ok(0)
        }
        Command::Config => {
            println!("{}", engine);
            Ok(0)
        }
        Command::BootReport => {
            let report = engine
                .boot_report()
                .ok_or_else(|| anyhow!("'boot-report' not configured"))?;
            Ok(report.send(engine.ctx()).await?)
        }
        Command::Mods => Ok(0),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("palhm: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        quiet = { true, 0, Some(4), 1 },
        one_v = { false, 1, Some(0), 4 },
        three_v = { false, 3, None, 6 },
        config_wins_without_flags = { false, 0, Some(2), 2 },
        builtin_default = { false, 0, None, DEFAULT_VL },
    )]
    fn verbosity_resolution(quiet: bool, verbose: u8, configured: Option<i64>, expect: i64) {
        assert_eq!(effective_vl(quiet, verbose, configured), expect);
    }

    #[test]
    fn cli_parses_flags_and_commands() {
        let cli = Cli::parse_from(["palhm", "-v", "-v", "-f", "/tmp/x.json", "run", "nightly"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("/tmp/x.json"));
        assert!(matches!(cli.command, Command::Run { task: Some(t) } if t == "nightly"));
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["palhm", "-q", "-v", "config"]).is_err());
    }

    #[test]
    fn unknown_command_is_a_parse_error() {
        assert!(Cli::try_parse_from(["palhm", "frobnicate"]).is_err());
    }
}
