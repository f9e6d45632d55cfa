//! Diagnostic actions.

use std::fmt;

use clap::ValueEnum;
use mailprobe_core::ResultSink;

use crate::handlers::{self, RunContext};

/// A diagnostic action selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Connect, read the banner and list EHLO capabilities.
    #[value(name = "testconnect")]
    TestConnect,
    /// Connect, upgrade to TLS and authenticate.
    #[value(name = "testauth")]
    TestAuth,
    /// Connect, optionally authenticate and send a test message.
    #[value(name = "sendmail")]
    SendMail,
}

impl Action {
    /// Name used on the command line, in log rows and log file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TestConnect => "testconnect",
            Self::TestAuth => "testauth",
            Self::SendMail => "sendmail",
        }
    }

    /// Result log columns (without the timestamp).
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::TestConnect => handlers::testconnect::COLUMNS,
            Self::TestAuth => handlers::testauth::COLUMNS,
            Self::SendMail => handlers::sendmail::COLUMNS,
        }
    }

    /// Runs the action, appending exactly one row to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the error that made the run fail; a FAILURE row has already
    /// been written for it.
    pub async fn run(self, ctx: &mut RunContext, sink: &mut dyn ResultSink) -> anyhow::Result<()> {
        sink.write_header(self.columns())?;
        match self {
            Self::TestConnect => handlers::testconnect::run(ctx, sink).await,
            Self::TestAuth => handlers::testauth::run(ctx, sink).await,
            Self::SendMail => handlers::sendmail::run(ctx, sink).await,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
