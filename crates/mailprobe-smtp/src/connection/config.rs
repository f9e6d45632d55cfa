//! Session configuration types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::proxy::ProxyConfig;
use crate::error::{Error, Result};
use crate::tls::TlsSettings;

/// Default EHLO name.
pub const DEFAULT_LOCAL_NAME: &str = "mailprobe.local";

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 25). **Credentials travel in the clear.**
    Plaintext,
    /// Start with plaintext, upgrade with STARTTLS (port 587).
    #[default]
    StartTls,
    /// TLS from the first byte (port 465).
    ImplicitTls,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Plaintext => 25,
            Self::StartTls => 587,
            Self::ImplicitTls => 465,
        }
    }

    /// Short name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "plain",
            Self::StartTls => "starttls",
            Self::ImplicitTls => "implicit",
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Security {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "plaintext" | "none" => Ok(Self::Plaintext),
            "starttls" => Ok(Self::StartTls),
            "implicit" | "tls" | "smtps" => Ok(Self::ImplicitTls),
            other => Err(Error::Config(format!(
                "unknown security mode {other:?} (expected plain, starttls or implicit)"
            ))),
        }
    }
}

/// Deadlines applied by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Dial, proxy negotiation, TLS handshake and banner.
    pub connect: Duration,
    /// One command and its reply.
    pub command: Duration,
    /// Transmission of the message body and the final reply.
    pub data: Duration,
    /// Budget for the whole session, counted from `connect`.
    pub operation: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            command: Duration::from_secs(60),
            data: Duration::from_secs(300),
            operation: None,
        }
    }
}

/// Everything a session needs to reach and talk to a server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Name sent with EHLO.
    pub local_name: String,
    /// TLS settings for implicit TLS and STARTTLS.
    pub tls: TlsSettings,
    /// Optional outbound proxy.
    pub proxy: Option<ProxyConfig>,
    /// Deadlines.
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Creates a configuration with STARTTLS on port 587.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        SessionConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }

    /// Name used for SNI and certificate checks.
    #[must_use]
    pub fn tls_server_name(&self) -> &str {
        self.tls.server_name.as_deref().unwrap_or(&self.host)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    local_name: String,
    tls: TlsSettings,
    proxy: Option<ProxyConfig>,
    timeouts: Timeouts,
}

impl SessionConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::default(),
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            tls: TlsSettings::default(),
            proxy: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Sets the port. Defaults to the security mode's port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    /// Sets the TLS settings.
    #[must_use]
    pub fn tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    /// Routes the connection through a proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.command = timeout;
        self
    }

    /// Sets the DATA transmission timeout.
    #[must_use]
    pub const fn data_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.data = timeout;
        self
    }

    /// Sets an end-to-end budget for the session.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.operation = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            host: self.host,
            security: self.security,
            local_name: self.local_name,
            tls: self.tls,
            proxy: self.proxy,
            timeouts: self.timeouts,
        }
    }
}
