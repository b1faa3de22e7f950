//! Bandwidth limiting for response bodies.
//!
//! A [`RateLimiter`] drains any [`AsyncRead`] to completion while keeping the
//! average throughput at or below a configured [`ByteRate`]. Each worker owns
//! its own pacing state; nothing here is shared between workers.

use std::fmt::{self, Display};
use std::io;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;

/// Upper bound for a single read from the body
const MAX_CHUNK_SIZE: usize = 16 * 1024;

/// Maximum number of bytes per second a single worker may read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteRate {
    /// No pacing at all
    #[default]
    Unlimited,
    /// At most this many bytes per second
    PerSecond(NonZeroU64),
}

impl ByteRate {
    /// Bytes per second, or `None` when unlimited
    #[must_use]
    pub const fn bytes_per_second(self) -> Option<u64> {
        match self {
            ByteRate::Unlimited => None,
            ByteRate::PerSecond(rate) => Some(rate.get()),
        }
    }
}

impl FromStr for ByteRate {
    type Err = ConfigError;

    /// Parse a rate such as `4096`, `512k` or `1.5m`.
    ///
    /// Suffixes `k`, `m`, `g`, `t` and `p` multiply by powers of 1024.
    /// Empty, zero and negative values mean unlimited.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRateLimit(input.to_string());

        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Ok(ByteRate::Unlimited);
        }

        let (number, exponent) = match normalized.chars().last() {
            Some('k') => (&normalized[..normalized.len() - 1], 1),
            Some('m') => (&normalized[..normalized.len() - 1], 2),
            Some('g') => (&normalized[..normalized.len() - 1], 3),
            Some('t') => (&normalized[..normalized.len() - 1], 4),
            Some('p') => (&normalized[..normalized.len() - 1], 5),
            _ => (normalized.as_str(), 0),
        };

        let value: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }

        let bytes = value * 1024_f64.powi(exponent);
        if bytes >= u64::MAX as f64 {
            return Err(invalid());
        }

        // Fractional bytes are truncated; anything below one byte is no limit.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bytes = if bytes < 1.0 { 0 } else { bytes as u64 };
        Ok(NonZeroU64::new(bytes).map_or(ByteRate::Unlimited, ByteRate::PerSecond))
    }
}

impl Display for ByteRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteRate::Unlimited => write!(f, "unlimited"),
            ByteRate::PerSecond(rate) => write!(f, "{rate} B/s"),
        }
    }
}

/// How a drain ended
#[derive(Debug)]
pub enum DrainEnd {
    /// The reader reached end of stream
    Complete,
    /// The cancellation token fired first
    Cancelled,
    /// The deadline passed first
    DeadlineExceeded,
    /// The reader failed
    Failed(io::Error),
}

/// Result of draining a body
#[derive(Debug)]
pub struct Drained {
    /// Number of bytes read, including those read before an early end
    pub bytes: u64,
    /// Why draining stopped
    pub end: DrainEnd,
}

impl Drained {
    /// Whether the whole body was consumed
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.end, DrainEnd::Complete)
    }
}

/// Drains readers while enforcing a [`ByteRate`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    rate: ByteRate,
}

impl RateLimiter {
    /// Create a limiter for the given rate
    #[must_use]
    pub const fn new(rate: ByteRate) -> Self {
        Self { rate }
    }

    /// The configured rate
    #[must_use]
    pub const fn rate(&self) -> ByteRate {
        self.rate
    }

    #[allow(clippy::cast_possible_truncation)]
    fn chunk_size(&self) -> usize {
        match self.rate.bytes_per_second() {
            Some(rate) => (rate.min(MAX_CHUNK_SIZE as u64)) as usize,
            None => MAX_CHUNK_SIZE,
        }
    }

    /// Read `reader` until end of stream and discard the data.
    ///
    /// Reading and waiting for bandwidth allowance both race against
    /// `cancel` and `deadline`. Whatever ends the drain, the bytes read so
    /// far are returned with it.
    pub async fn drain<R>(
        &self,
        mut reader: R,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Drained
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0; self.chunk_size()];
        let mut pacer = self.rate.bytes_per_second().map(Pacer::new);
        let mut bytes = 0;

        let deadline = sleep_until(deadline);
        tokio::pin!(deadline);

        let end = loop {
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => break DrainEnd::Cancelled,
                () = &mut deadline => break DrainEnd::DeadlineExceeded,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break DrainEnd::Complete,
                    Ok(read) => read as u64,
                    Err(e) => break DrainEnd::Failed(e),
                },
            };
            bytes += read;

            let Some(delay) = pacer.as_mut().and_then(|p| p.record(read)) else {
                continue;
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => break DrainEnd::Cancelled,
                () = &mut deadline => break DrainEnd::DeadlineExceeded,
                () = sleep(delay) => {}
            }
        };

        Drained { bytes, end }
    }
}

/// Checkpoint bookkeeping: bytes read since `since`, compared against what
/// the rate allows for the elapsed time.
#[derive(Debug)]
struct Pacer {
    rate: u64,
    since: Instant,
    bytes: u64,
}

impl Pacer {
    fn new(rate: u64) -> Self {
        Self {
            rate,
            since: Instant::now(),
            bytes: 0,
        }
    }

    /// Account for `read` new bytes and return how long to wait, if at all.
    #[allow(clippy::cast_precision_loss)]
    fn record(&mut self, read: u64) -> Option<Duration> {
        self.bytes += read;
        let elapsed = self.since.elapsed();
        let allowed = Duration::from_secs_f64(self.bytes as f64 / self.rate as f64);

        if allowed > elapsed {
            return Some(allowed - elapsed);
        }
        // Behind the allowance: start over so no burst credit is banked.
        self.since = Instant::now();
        self.bytes = 0;
        None
    }
}
