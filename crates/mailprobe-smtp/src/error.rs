//! Error types for SMTP session operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP session error types.
///
/// Errors carry the server's reply text and the (redacted) command that
/// triggered them. They never carry credential values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dial, read, write or banner failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed reply, or a non-success reply where success was required.
    #[error("Protocol error{}: {message}", command_suffix(.command, .code))]
    Protocol {
        /// Command that triggered the reply, if any.
        command: Option<String>,
        /// Reply code, if a reply was parsed.
        code: Option<u16>,
        /// Server text or parser diagnostic.
        message: String,
    },

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// No compatible mechanism, or the server rejected the credentials.
    #[error("Authentication failed{}: {message}", command_suffix(.mechanism, .code))]
    Auth {
        /// Mechanism that was attempted.
        mechanism: Option<String>,
        /// Reply code, if the server answered.
        code: Option<u16>,
        /// Server text or local diagnostic.
        message: String,
    },

    /// A RCPT TO command was rejected.
    #[error("Recipient <{recipient}> rejected ({code}): {message}")]
    RecipientRejected {
        /// The rejected recipient address.
        recipient: String,
        /// Reply code.
        code: u16,
        /// Server text.
        message: String,
    },

    /// A step did not complete before its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Step that timed out.
        operation: &'static str,
        /// Deadline that was applied.
        after: Duration,
    },

    /// The session's cancellation token fired.
    #[error("{0} cancelled")]
    Cancelled(&'static str),

    /// Feature not advertised by the server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Operation not valid in the current session phase.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message exceeds the server's advertised SIZE.
    #[error("Message of {size} bytes exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Message size in bytes.
        size: usize,
        /// Advertised limit in bytes.
        limit: usize,
    },

    /// Invalid session configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn command_suffix(context: &Option<String>, code: &Option<u16>) -> String {
    match (context.as_deref(), *code) {
        (Some(ctx), Some(code)) => format!(" ({ctx} -> {code})"),
        (Some(ctx), None) => format!(" ({ctx})"),
        (None, Some(code)) => format!(" ({code})"),
        (None, None) => String::new(),
    }
}

/// Coarse error classification used by callers for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure, including timeouts and cancellation.
    Connection,
    /// Server replied with something unexpected.
    Protocol,
    /// TLS failure.
    Tls,
    /// Authentication failure.
    Auth,
    /// Caller misuse or invalid input.
    Usage,
}

impl Error {
    /// Creates a protocol error from a parser diagnostic.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Protocol {
            command: None,
            code: None,
            message: message.into(),
        }
    }

    /// Creates a protocol error for an unexpected reply to `command`.
    #[must_use]
    pub fn unexpected_reply(
        command: impl Into<String>,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            command: Some(command.into()),
            code: Some(code),
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn auth(mechanism: Option<&str>, code: Option<u16>, message: impl Into<String>) -> Self {
        Self::Auth {
            mechanism: mechanism.map(str::to_string),
            code,
            message: message.into(),
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Timeout { .. } | Self::Cancelled(_) => {
                ErrorKind::Connection
            }
            Self::Protocol { .. } | Self::RecipientRejected { .. } | Self::NotSupported(_) => {
                ErrorKind::Protocol
            }
            Self::Tls(_) => ErrorKind::Tls,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::InvalidState(_)
            | Self::InvalidAddress(_)
            | Self::MessageTooLarge { .. }
            | Self::Config(_) => ErrorKind::Usage,
        }
    }

    /// Returns the SMTP reply code attached to this error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Protocol { code, .. } | Self::Auth { code, .. } => *code,
            Self::RecipientRejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.reply_code(), Some(code) if code >= 500 && code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.reply_code(), Some(code) if code >= 400 && code < 500)
    }

    /// Returns true if the session's stream can no longer be used after this error.
    ///
    /// A malformed reply is fatal: the rest of it is still buffered and
    /// would be read as the reply to the next command.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Timeout { .. }
                | Self::Cancelled(_)
                | Self::Tls(_)
                | Self::Protocol { command: None, .. }
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn protocol_display_includes_command_and_code() {
        let err = Error::unexpected_reply("EHLO probe.local", 502, "not implemented");
        assert_eq!(
            err.to_string(),
            "Protocol error (EHLO probe.local -> 502): not implemented"
        );
    }

    #[test]
    fn malformed_display_has_no_context() {
        let err = Error::malformed("malformed response line: \"xyz\"");
        assert_eq!(
            err.to_string(),
            "Protocol error: malformed response line: \"xyz\""
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(
            Error::Connection("eof".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(Error::Cancelled("EHLO").kind(), ErrorKind::Connection);
        assert_eq!(Error::Tls("bad cert".into()).kind(), ErrorKind::Tls);
        assert_eq!(
            Error::auth(Some("PLAIN"), Some(535), "no").kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            Error::InvalidState("closed".into()).kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn permanent_and_transient() {
        let permanent = Error::RecipientRejected {
            recipient: "a@b.c".into(),
            code: 550,
            message: "no such user".into(),
        };
        assert!(permanent.is_permanent());
        assert!(!permanent.is_transient());

        let transient = Error::unexpected_reply("MAIL FROM:<a@b.c>", 451, "try later");
        assert!(transient.is_transient());
        assert!(!Error::Connection("reset".into()).is_permanent());
    }

    #[test]
    fn malformed_reply_is_fatal_but_refusal_is_not() {
        assert!(Error::malformed("mismatched reply code").is_fatal());
        assert!(!Error::unexpected_reply("NOOP", 502, "no").is_fatal());
        assert!(!Error::auth(Some("PLAIN"), Some(535), "no").is_fatal());
    }

    #[test]
    fn io_errors_become_connection_errors() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer").into();
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.is_fatal());
    }
}
