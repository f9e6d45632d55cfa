//! # mailprobe-core
//!
//! Supporting services for the `mailprobe` diagnostic tool.
//!
//! This crate provides:
//! - **Result logs** - one CSV or JSONL row per run, appended to a per-day file
//! - **Masking** - credential redaction for logs and console output
//! - **Validation** - operator input checks (addresses, hostnames, ports)
//! - **Rate limiting** - token bucket pacing between runs
//! - **Retry** - exponential backoff around whole operations

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod log;
pub mod mask;
pub mod ratelimit;
pub mod retry;
pub mod validation;

pub use error::{Error, Result};
pub use log::{LogFormat, ResultSink, open_sink};
pub use mask::mask;
pub use ratelimit::RateLimiter;
pub use retry::RetryPolicy;
pub use validation::ValidationError;
