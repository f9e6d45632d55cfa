//! `mailprobe` - SMTP diagnostics from the command line.
//!
//! Runs one action (`testconnect`, `testauth` or `sendmail`) against a
//! server and appends a result row to a CSV or JSONL log.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod action;
mod cli;
mod config;
mod exchange;
mod handlers;
mod message;
mod report;

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use config::Config;
use handlers::RunContext;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let action = config.action;

    let mut sink = match mailprobe_core::open_sink(
        config.log_format,
        config.log_dir.as_deref(),
        env!("CARGO_PKG_NAME"),
        action.as_str(),
    ) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("Could not open result log: {err}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    println!("Logging to: {}\n", sink.path().display());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, closing the session...");
                cancel.cancel();
            }
        }
    });

    info!(action = %action, host = %config.host, port = config.port, "starting");
    let mut ctx = RunContext::new(config, cancel);
    let outcome = action.run(&mut ctx, sink.as_mut()).await;

    if let Err(err) = sink.close() {
        eprintln!("Could not flush result log: {err}");
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "mailprobe=debug,mailprobe_core=debug,mailprobe_smtp=debug,mailprobe_smtp::wire=debug"
    } else {
        "mailprobe=info,mailprobe_core=info,mailprobe_smtp=info,mailprobe_smtp::wire=off"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
