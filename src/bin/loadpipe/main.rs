//! `loadpipe` keeps a configurable number of workers requesting one URL until
//! it is interrupted.
//!
//! Hammer a local test server with 32 workers:
//! ```sh
//! loadpipe --url http://localhost:8080/big.iso -w 32
//! ```
//!
//! One request per second per worker, each download capped at 512 KiB/s:
//! ```sh
//! loadpipe --url http://localhost:8080/big.iso -w 4 -i 1s --rate 512k
//! ```
//!
//! Every flag can also be set through the environment variable of the same
//! name, which is handy in containers:
//! ```sh
//! url=http://localhost:8080/big.iso w=8 rate=1m loadpipe
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    missing_debug_implementations,
    unreachable_pub,
    unused_extern_crates
)]

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::{error, info, LevelFilter};
#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature

mod options;
mod stats;

use crate::options::{Format, LoadpipeOptions};
use crate::stats::{ResponseStats, Summary};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    ConfigError = 2,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap "main" code in another function to guarantee that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

fn run_main() -> Result<i32> {
    let opts = LoadpipeOptions::parse();
    init_logging(opts.verbose, opts.quiet);

    // Resolve everything up front; no worker starts on a broken config.
    let config = match opts.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::ConfigError as i32);
        }
    };

    let runtime = match opts.threads {
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    runtime.block_on(run(&opts, config))
}

/// Initialize logging. `RUST_LOG` wins over `-v`/`-q` when set.
fn init_logging(verbose: u8, quiet: bool) {
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = match (quiet, verbose) {
            (true, _) => LevelFilter::Warn,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        };
        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("loadpipe", level_filter);
    }

    builder.init();
}

async fn run(opts: &LoadpipeOptions, config: loadpipe::RunConfig) -> Result<i32> {
    let workers = config.workers();
    let stats = Arc::new(ResponseStats::new());

    let started = Instant::now();
    let run = match loadpipe::start(config, stats.clone()) {
        Ok(run) => run,
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::ConfigError as i32);
        }
    };
    info!("Running, press Ctrl+C to stop");

    let reason = shutdown_signal(opts.duration).await?;
    info!("{reason}, stopping...");
    let stopped = run.stop().await;
    info!("All {stopped} workers stopped");

    let summary = stats.summary(workers, started.elapsed());
    let formatted = fmt(&summary, opts.format)?;
    if let Some(output) = &opts.output {
        fs::write(output, formatted).context("Cannot write summary to file")?;
    } else {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{formatted}")?;
    }

    Ok(ExitCode::Success as i32)
}

/// Resolves on Ctrl+C, SIGTERM, or once `duration` has passed.
async fn shutdown_signal(duration: Option<Duration>) -> Result<&'static str> {
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())?.recv().await;
        Ok::<_, std::io::Error>(())
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("Cannot listen for Ctrl+C")?;
            Ok("Received interrupt")
        }
        terminated = terminate => {
            terminated.context("Cannot listen for SIGTERM")?;
            Ok("Received termination signal")
        }
        () = deadline => Ok("Run duration elapsed"),
    }
}

fn fmt(summary: &Summary, format: Format) -> Result<String> {
    Ok(match format {
        Format::String => summary.to_string(),
        Format::Json => serde_json::to_string_pretty(summary)?,
    })
}
