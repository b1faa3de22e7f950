use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use loadpipe::config::{DEFAULT_URL, DEFAULT_USER_AGENT, DEFAULT_WORKERS};
use loadpipe::{parse_interval, ByteRate, ConfigError, RunConfig};

/// Output format of the run summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Format {
    #[default]
    String,
    Json,
}

/// Every setting can also be given through the environment variable of the
/// same name (e.g. `w=32` for `-w 32`). Flags take precedence.
#[derive(Debug, Parser)]
#[command(
    name = "loadpipe",
    version,
    about = "Keep a pool of workers requesting a single URL until stopped."
)]
pub(crate) struct LoadpipeOptions {
    /// Target URL
    #[arg(long, env = "url", default_value = DEFAULT_URL)]
    pub(crate) url: String,

    /// Pause between two requests of the same worker (e.g. `500ms`, `2s`).
    /// `0` sends requests back-to-back
    #[arg(short, long, env = "i", default_value = "0", allow_hyphen_values = true)]
    pub(crate) interval: String,

    /// Number of concurrent workers
    #[arg(short, long, env = "w", default_value_t = DEFAULT_WORKERS)]
    pub(crate) workers: usize,

    /// User agent
    #[arg(long = "ua", visible_alias = "user-agent", env = "ua", default_value = DEFAULT_USER_AGENT)]
    pub(crate) user_agent: String,

    /// Only connect over IPv4.
    /// The environment variable accepts `1`/`0`, `t`/`f`, `true`/`false` and alike
    #[arg(
        short = '4',
        long = "ipv4",
        env = "4",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub(crate) ipv4: bool,

    /// Only connect over IPv6, see `--ipv4`
    #[arg(
        short = '6',
        long = "ipv6",
        env = "6",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub(crate) ipv6: bool,

    /// Per-worker download limit in bytes per second.
    /// Accepts suffixes k, m, g, t, p (powers of 1024), e.g. `1.5m`
    #[arg(long, env = "rate")]
    pub(crate) rate: Option<String>,

    /// Local IP address to send requests from
    #[arg(long, env = "bind")]
    pub(crate) bind: Option<String>,

    /// Stop on your own after this long (e.g. `30s`, `1h`) instead of
    /// waiting for Ctrl+C
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,

    /// Output format of the summary printed on exit
    #[arg(short, long, value_enum, default_value = "string")]
    pub(crate) format: Format,

    /// Write the summary to this file instead of stdout
    #[arg(short, long)]
    pub(crate) output: Option<PathBuf>,

    /// Number of runtime threads.
    /// Defaults to number of cores available to the system
    #[arg(short = 'T', long)]
    pub(crate) threads: Option<usize>,

    /// Log more (`-vv` for even more)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub(crate) verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub(crate) quiet: bool,
}

impl LoadpipeOptions {
    /// Resolve the options into the configuration of a run
    pub(crate) fn to_config(&self) -> Result<RunConfig, ConfigError> {
        let rate: ByteRate = self.rate.as_deref().unwrap_or_default().parse()?;

        let mut builder = RunConfig::builder();
        builder
            .url(self.url.as_str())
            .workers(self.workers)
            .interval(parse_interval(&self.interval)?)
            .user_agent(self.user_agent.as_str())
            .rate_limit(rate)
            .ipv4_only(self.ipv4)
            .ipv6_only(self.ipv6);
        if let Some(bind) = &self.bind {
            builder.bind_address(bind.as_str());
        }
        builder.build()
    }
}
