//! Action handlers.
//!
//! Every handler follows the same outline: wait for the rate limiter, open
//! a session (retrying connection failures), EHLO, upgrade with STARTTLS
//! when configured, then run its own steps. Exactly one row is written per
//! run; a failure row carries whatever was learned before the error. The
//! session is always closed before the handler returns.

pub mod sendmail;
pub mod testauth;
pub mod testconnect;

#[cfg(test)]
mod testing;

use mailprobe_core::RateLimiter;
use mailprobe_smtp::{Error as SmtpError, ErrorKind, Security, Session};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::report;

/// Row status for a completed run.
pub const SUCCESS: &str = "SUCCESS";
/// Row status for a failed run.
pub const FAILURE: &str = "FAILURE";

/// State shared by the handlers of one run.
#[derive(Debug)]
pub struct RunContext {
    pub config: Config,
    pub cancel: CancellationToken,
    limiter: RateLimiter,
}

impl RunContext {
    #[must_use]
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        let limiter = config.rate_limiter();
        Self {
            config,
            cancel,
            limiter,
        }
    }

    /// Waits for a rate-limit token, then dials and reads the banner.
    ///
    /// Connection-class failures are retried per the configured policy.
    /// Protocol, TLS and auth failures are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last connect error, or `Cancelled` if the run was
    /// interrupted.
    pub async fn open_session(&mut self) -> Result<Session, SmtpError> {
        self.limiter
            .wait(&self.cancel)
            .await
            .map_err(|_| SmtpError::Cancelled("rate limit wait"))?;

        let session_config = self.config.session_config();
        let cancel = self.cancel.clone();
        tracing::debug!(
            host = %session_config.host,
            port = session_config.port,
            security = %session_config.security,
            "opening session"
        );

        self.config
            .retry
            .run(
                &self.cancel,
                |attempt| {
                    let session_config = session_config.clone();
                    let cancel = cancel.clone();
                    async move {
                        if attempt > 1 {
                            tracing::info!(attempt, "reconnecting");
                        }
                        let mut session = Session::new(session_config).with_cancellation(cancel);
                        session.connect().await?;
                        Ok::<_, SmtpError>(session)
                    }
                },
                is_retryable,
            )
            .await
    }

    /// Port as it appears in log rows.
    #[must_use]
    pub fn port(&self) -> String {
        self.config.port.to_string()
    }

    /// Prints the TLS report for the current session when verbose.
    pub fn print_tls_report(&self, session: &Session, heading: Option<&str>) {
        if !self.config.verbose {
            return;
        }
        if let Some(tls) = session.tls() {
            if let Some(heading) = heading {
                println!("\n{heading}");
            }
            print!("{}", report::tls_report(tls, self.config.tls.skip_verify));
        }
    }
}

/// Only transport-level failures are worth another attempt.
fn is_retryable(err: &SmtpError) -> bool {
    err.kind() == ErrorKind::Connection && !matches!(err, SmtpError::Cancelled(_))
}

/// EHLO, then STARTTLS and a second EHLO when the session is configured for it.
///
/// # Errors
///
/// Returns the first failing step's error. STARTTLS not being advertised
/// is an error in `StartTls` mode.
pub async fn greet(ctx: &RunContext, session: &mut Session) -> Result<(), SmtpError> {
    session.ehlo().await?;
    if ctx.config.security == Security::StartTls {
        println!("Upgrading to TLS...");
        session.starttls().await?;
        println!("✓ TLS upgrade successful");
        session.ehlo().await?;
    }
    Ok(())
}

/// Prints the connect line shared by all handlers.
pub fn print_connected(ctx: &RunContext) {
    if ctx.config.security == Security::ImplicitTls {
        println!("✓ Connected with SMTPS (implicit TLS)");
    } else {
        println!("✓ Connected");
    }
}
