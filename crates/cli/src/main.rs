// SPDX-License-Identifier: MIT

//! `sdp_transfer`: supervisor entry point (spec §6). Validates its
//! arguments, wires up logging, and runs `SdpTransfer` until the process
//! receives a shutdown signal.

mod args;
mod exit_error;

use std::path::Path;

use anyhow::anyhow;
use args::Args;
use clap::Parser;
use exit_error::ExitError;
use sdp_daemon::{Config, SdpTransfer};
use tracing_subscriber::EnvFilter;

const EXIT_INVALID_ARGS: i32 = 1;
const EXIT_RUNTIME_ERROR: i32 = 2;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = try_main(args) {
        eprintln!("{err}");
        let code = err
            .downcast_ref::<ExitError>()
            .map(|e| e.code)
            .unwrap_or(EXIT_RUNTIME_ERROR);
        std::process::exit(code);
    }
}

fn try_main(args: Args) -> anyhow::Result<()> {
    validate_paths(&args.local_path, &args.remote_path)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|source| anyhow!("failed to start async runtime: {source}"))?;

    runtime.block_on(run(args));
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// spec §6: `LOCAL_PATH` must exist; `REMOTE_PATH` must exist and be
/// writable. Checked up front so a misconfigured invocation fails fast
/// with exit code 1 instead of surfacing as a runtime error mid-poll.
fn validate_paths(local_path: &Path, remote_path: &Path) -> anyhow::Result<()> {
    if !local_path.is_dir() {
        return Err(ExitError::new(
            EXIT_INVALID_ARGS,
            format!("LOCAL_PATH {} is not an existing directory", local_path.display()),
        )
        .into());
    }
    if !remote_path.is_dir() {
        return Err(ExitError::new(
            EXIT_INVALID_ARGS,
            format!("REMOTE_PATH {} is not an existing directory", remote_path.display()),
        )
        .into());
    }
    let probe = remote_path.join(".sdp_transfer_write_check");
    match std::fs::write(&probe, []) {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            Ok(())
        }
        Err(source) => Err(ExitError::new(
            EXIT_INVALID_ARGS,
            format!("REMOTE_PATH {} is not writable: {source}", remote_path.display()),
        )
        .into()),
    }
}

async fn run(args: Args) {
    let config = Config::new(
        args.local_path,
        args.remote_path,
        args.subsystem,
        args.data_product_dashboard,
    );
    let supervisor = SdpTransfer::new(config);
    let cancel = supervisor.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            cancel.cancel();
        }
    });

    let report = supervisor.run().await;
    tracing::info!(report = %report.render(), "shutdown complete");
}
