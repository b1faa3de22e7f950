#![warn(missing_docs)]

//! `loadpipe` keeps a pool of workers busy requesting a single URL.
//!
//! Build a [`RunConfig`], hand it to [`start`] and call [`RunHandle::stop`]
//! when done. Every worker sends GET requests in a loop, drains each response
//! body (optionally throttled to a byte rate) and reports what happened to a
//! [`Reporter`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use loadpipe::{start, LogReporter, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::builder()
//!         .url("http://localhost:8080/file.bin")
//!         .workers(4_usize)
//!         .rate_limit("512k".parse::<loadpipe::ByteRate>()?)
//!         .build()?;
//!
//!     let run = start(config, Arc::new(LogReporter))?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     let stopped = run.stop().await;
//!     assert_eq!(stopped, 4);
//!     Ok(())
//! }
//! ```
mod client;
mod coordinator;
mod egress;
mod error;
mod ratelimit;
mod report;
mod types;
mod worker;

#[cfg(test)]
mod test_utils;

pub mod config;

pub use client::{Client, REQUEST_TIMEOUT};
pub use config::{parse_interval, AddressFamily, RunConfig, RunConfigBuilder};
pub use coordinator::{start, RunHandle, WorkerHandle};
pub use egress::EgressPolicy;
pub use error::{ConfigError, RequestError};
pub use ratelimit::{ByteRate, DrainEnd, Drained, RateLimiter};
pub use report::{LogReporter, Reporter};
pub use types::{RequestOutcome, WorkerId};
pub use tokio_util::sync::CancellationToken;
