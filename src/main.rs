use anyhow::Context;
use callwrap::cli::{Cli, Command};
use callwrap::crash::CrashCapture;
use callwrap::error::exit_code;
use callwrap::host::{StderrWarning, TracingLog};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(callwrap_err) = e.downcast_ref::<callwrap::Error>() {
                ExitCode::from(callwrap_err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Validate CLI arguments
    cli.validate()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Invalid arguments")?;

    callwrap::logging::init(&cli.log);

    match cli.command {
        Command::Profile {
            value,
            repeat,
            sort,
            limit,
            min_time,
            clock,
        } => {
            let config = callwrap::cli::profile_config(sort, limit, min_time, clock)
                .context("Invalid profiling configuration")?;
            let result = callwrap::commands::profile::run(config, value, repeat)?;
            eprintln!("Result: {}", result);
        }
        Command::Lines { start } => {
            let steps = callwrap::commands::lines::run(start)?;
            eprintln!("Result: {} steps", steps);
        }
        Command::Crash { kind } => {
            let capture = CrashCapture::new(TracingLog, StderrWarning);
            if !callwrap::commands::crash::run(&capture, kind) {
                return Ok(exit_code::FAILURE_SUPPRESSED);
            }
        }
    }

    Ok(exit_code::SUCCESS)
}
