//! Token bucket rate limiting between runs.
//!
//! - Tokens are added at a constant rate (`rps`)
//! - Each operation consumes one token
//! - The bucket holds one token, so the first operation never waits
//!
//! A rate of zero or less disables limiting.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rps: f64) -> Self {
        Self {
            tokens: 1.0,
            capacity: 1.0,
            refill_rate: rps,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed
            .mul_add(self.refill_rate, self.tokens)
            .min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
    }
}

/// Paces operations to at most `rps` per second.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<TokenBucket>,
    rps: f64,
}

impl RateLimiter {
    /// Creates a limiter; `rps <= 0` disables it.
    #[must_use]
    pub fn new(rps: f64) -> Self {
        if rps > 0.0 && rps.is_finite() {
            Self {
                bucket: Some(TokenBucket::new(rps)),
                rps,
            }
        } else {
            Self {
                bucket: None,
                rps: 0.0,
            }
        }
    }

    /// A limiter that never waits.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            bucket: None,
            rps: 0.0,
        }
    }

    /// Returns true if limiting is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Configured rate, or 0 when disabled.
    #[must_use]
    pub const fn rps(&self) -> f64 {
        self.rps
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&mut self) -> bool {
        self.bucket.as_mut().is_none_or(TokenBucket::try_consume)
    }

    /// Waits until a token is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(bucket) = self.bucket.as_mut() else {
            return Ok(());
        };
        loop {
            if bucket.try_consume() {
                return Ok(());
            }
            let delay = bucket.time_until_available();
            tracing::debug!(wait_seconds = delay.as_secs_f64(), "rate limited, waiting");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Display for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_enabled() {
            return f.write_str("rate limiting disabled (unlimited)");
        }
        if self.rps < 1.0 {
            write!(
                f,
                "{:.2} rps (1 request per {:.1}s)",
                self.rps,
                1.0 / self.rps
            )
        } else {
            write!(f, "{:.2} rps", self.rps)
        }
    }
}
