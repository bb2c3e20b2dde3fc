// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use devrunner::cli::Args;
use devrunner::{Error, Runner, RunnerConfig};
use log::{LevelFilter, error, info};
use tokio::signal::unix::{SignalKind, signal};

fn prepare(args: &Args) -> Result<Runner, Error> {
    let config = RunnerConfig::load(args.config.as_deref(), args.work_dir.as_deref())?;
    Runner::from_args(args.clone(), config)
}

async fn serve(runner: Runner) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    };

    runner
        .run(std::io::stdout(), shutdown)
        .await
        .with_context(|| format!("{} dev server failed", runner.kind()))
}

#[allow(clippy::print_stderr)]
fn report_without_logger(e: &devrun_log::InitError) {
    eprintln!("devrunner: {e}");
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // The logger comes up before any error is reported so that bad
    // configuration still reaches stderr in the usual format.
    let prepared = prepare(&args);
    let logger = match &prepared {
        Ok(runner) => runner.logger_builder(),
        Err(_) => devrun_log::Builder::new(LevelFilter::Info),
    };
    if let Err(e) = logger.init() {
        report_without_logger(&e);
        return ExitCode::FAILURE;
    }

    let runner = match prepared {
        Ok(runner) => runner,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("devrunner {} starting ({} backend)", env!("CARGO_PKG_VERSION"), runner.kind());

    match serve(runner).await {
        Ok(()) => {
            info!("devrunner exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
