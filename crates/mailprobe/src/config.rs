//! Validated run configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use mailprobe_core::mask::{MASK, mask_opt};
use mailprobe_core::{LogFormat, RateLimiter, RetryPolicy, validation};
use mailprobe_smtp::{
    Address, Credentials, ProxyConfig, Security, SessionConfig, TlsSettings, TlsVersionPolicy,
};

use crate::action::Action;
use crate::cli::Cli;

/// Everything one run needs, checked up front.
///
/// `Debug` masks the username and never prints secrets.
#[derive(Clone)]
pub struct Config {
    pub action: Action,
    pub host: String,
    pub port: u16,
    pub security: Security,
    pub local_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub auth_methods: Vec<String>,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub subject: String,
    pub body: String,
    pub tls: TlsSettings,
    pub proxy: Option<ProxyConfig>,
    pub rate_limit: f64,
    pub retry: RetryPolicy,
    pub command_timeout: Duration,
    pub operation_timeout: Option<Duration>,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl Config {
    /// Validates the parsed command line.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid or missing value.
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let host = cli.host.trim().to_string();
        validation::validate_hostname(&host)?;

        let security = if cli.smtps {
            Security::ImplicitTls
        } else {
            cli.security.unwrap_or_default()
        };
        let port = cli.port.unwrap_or_else(|| security.default_port());
        validation::validate_port(port)?;

        if cli.timeout == 0 {
            bail!("--timeout must be at least 1 second");
        }
        if cli.operation_timeout == Some(0) {
            bail!("--operation-timeout must be at least 1 second");
        }
        if !cli.rate_limit.is_finite() || cli.rate_limit < 0.0 {
            bail!("--rate-limit must be a non-negative number");
        }

        let username = non_empty(cli.username);
        let password = non_empty(cli.password);
        let access_token = non_empty(cli.access_token);
        let auth_methods: Vec<String> = cli
            .auth_method
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        if cli.action == Action::TestAuth {
            if username.is_none() {
                bail!("testauth requires --username");
            }
            if password.is_none() && access_token.is_none() {
                bail!("testauth requires --password or --access-token");
            }
        }

        let (from, to) = if cli.action == Action::SendMail {
            let from = cli.from.as_deref().context("sendmail requires --from")?;
            validation::validate_email("from", from)?;
            validation::validate_emails("to", &cli.to)?;
            let from = Address::new(from)?;
            let to = cli
                .to
                .iter()
                .map(Address::new)
                .collect::<Result<Vec<_>, _>>()?;
            (Some(from), to)
        } else {
            (None, Vec::new())
        };

        let tls = TlsSettings {
            server_name: non_empty(cli.sni),
            skip_verify: cli.skip_verify,
            version: if cli.pin_tls_version {
                TlsVersionPolicy::Exact(cli.tls_version)
            } else {
                TlsVersionPolicy::Minimum(cli.tls_version)
            },
            ..TlsSettings::default()
        };

        Ok(Self {
            action: cli.action,
            host,
            port,
            security,
            local_name: cli.local_name,
            username,
            password,
            access_token,
            auth_methods: if auth_methods.is_empty() {
                vec!["auto".to_string()]
            } else {
                auth_methods
            },
            from,
            to,
            subject: cli.subject,
            body: cli.body,
            tls,
            proxy: cli.proxy,
            rate_limit: cli.rate_limit,
            retry: RetryPolicy::new(cli.max_retries, Duration::from_millis(cli.retry_delay)),
            command_timeout: Duration::from_secs(cli.timeout),
            operation_timeout: cli.operation_timeout.map(Duration::from_secs),
            log_format: cli.log_format,
            log_dir: cli.log_dir,
            verbose: cli.verbose,
        })
    }

    /// Session settings for this run.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut builder = SessionConfig::builder(&self.host)
            .port(self.port)
            .security(self.security)
            .local_name(&self.local_name)
            .tls(self.tls.clone())
            .connect_timeout(self.command_timeout)
            .command_timeout(self.command_timeout);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }
        if let Some(budget) = self.operation_timeout {
            builder = builder.operation_timeout(budget);
        }
        builder.build()
    }

    /// Credentials, if a username and at least one secret were given.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.clone()?;
        if self.password.is_none() && self.access_token.is_none() {
            return None;
        }
        Some(Credentials {
            username,
            password: self.password.clone(),
            access_token: self.access_token.clone(),
        })
    }

    /// Rate limiter for this run.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.rate_limit)
    }

    /// `--auth-method` as given, for messages.
    #[must_use]
    pub fn requested_methods(&self) -> String {
        self.auth_methods.join(", ")
    }

    /// Recipients joined for display and logs.
    #[must_use]
    pub fn recipients(&self) -> String {
        self.to
            .iter()
            .map(Address::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("action", &self.action)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &mask_opt(self.username.as_deref()))
            .field("password", &self.password.as_ref().map(|_| MASK))
            .field("access_token", &self.access_token.as_ref().map(|_| MASK))
            .field("auth_methods", &self.auth_methods)
            .field("tls", &self.tls)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
