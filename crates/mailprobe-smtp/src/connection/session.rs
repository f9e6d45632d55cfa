//! SMTP session state machine.
//!
//! A [`Session`] drives one conversation:
//!
//! ```text
//! Disconnected --connect--> Connected --starttls--> TlsEstablished
//!                               |                         |
//!                               +--------auth-------------+--> Authenticated
//!
//! any phase --close / fatal error--> Closed
//! ```
//!
//! Every blocking step runs under a deadline (the step's timeout, capped by
//! the remaining operation budget) and races the session's cancellation
//! token. A timeout, cancellation, transport or TLS failure drops the stream
//! and leaves the session `Closed`.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::{SessionConfig, Security};
use super::proxy;
use super::stream::SmtpStream;
use crate::auth::{AuthMechanism, Credentials, sasl, select_mechanism};
use crate::command::{Command, dot_stuff};
use crate::error::{Error, Result};
use crate::tls::{ChainCheck, TlsSnapshot};
use crate::types::{Address, Capabilities, Reply, ReplyCode};

/// Tracing target for the `>>>` / `<<<` wire transcript.
pub const WIRE_TARGET: &str = "mailprobe_smtp::wire";

const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No connection yet.
    Disconnected,
    /// Banner received over a plaintext transport.
    Connected,
    /// TLS is active (implicit or via STARTTLS).
    TlsEstablished,
    /// AUTH succeeded.
    Authenticated,
    /// Closed; no further commands are possible.
    Closed,
}

/// One SMTP conversation over an exclusively owned transport.
#[derive(Debug)]
pub struct Session<S = TcpStream> {
    config: SessionConfig,
    stream: Option<SmtpStream<S>>,
    phase: SessionPhase,
    banner: Option<Reply>,
    capabilities: Capabilities,
    needs_ehlo: bool,
    tls: Option<TlsSnapshot>,
    authenticated: bool,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<S> Session<S> {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            stream: None,
            phase: SessionPhase::Disconnected,
            banner: None,
            capabilities: Capabilities::default(),
            needs_ehlo: true,
            tls: None,
            authenticated: false,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Uses `token` to abort blocking steps.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The greeting reply, once connected.
    #[must_use]
    pub const fn banner(&self) -> Option<&Reply> {
        self.banner.as_ref()
    }

    /// Banner text (lines joined with a space), or `""` before connecting.
    #[must_use]
    pub fn banner_text(&self) -> String {
        self.banner
            .as_ref()
            .map(|b| b.lines.join(" "))
            .unwrap_or_default()
    }

    /// Capabilities from the most recent EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// TLS snapshot, once TLS is active.
    #[must_use]
    pub const fn tls(&self) -> Option<&TlsSnapshot> {
        self.tls.as_ref()
    }

    /// True once AUTH has succeeded. Never reset.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// True while a transport is held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn start_budget(&mut self) {
        if self.deadline.is_none() {
            self.deadline = self.config.timeouts.operation.map(|d| Instant::now() + d);
        }
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        match self.phase {
            SessionPhase::Disconnected => Err(Error::InvalidState(format!(
                "{operation} requires a connected session"
            ))),
            SessionPhase::Closed => Err(Error::InvalidState(format!(
                "{operation} on a closed session"
            ))),
            _ if self.stream.is_none() => Err(Error::InvalidState(format!(
                "{operation} without a transport"
            ))),
            _ => Ok(()),
        }
    }

    fn ensure_greeted(&self, operation: &str) -> Result<()> {
        self.ensure_open(operation)?;
        if self.needs_ehlo {
            return Err(Error::InvalidState(format!(
                "{operation} requires EHLO first"
            )));
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.stream = None;
        self.phase = SessionPhase::Closed;
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                tracing::debug!(error = %err, "closing session after fatal error");
                self.abort();
            }
        }
        result
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the connect sequence over an already established transport:
    /// implicit TLS handshake (if configured) and banner.
    ///
    /// # Errors
    ///
    /// Returns a TLS error if the handshake fails, and a connection error on
    /// read failure or a banner outside 2xx.
    pub async fn connect_with(&mut self, transport: S) -> Result<&Reply> {
        if self.phase != SessionPhase::Disconnected {
            return Err(Error::InvalidState("session already connected".into()));
        }
        self.start_budget();
        let step = self.config.timeouts.connect;

        let mut stream = if self.config.security == Security::ImplicitTls {
            let connector = self.config.tls.connector_with_check();
            let name = self.config.tls.server_name(&self.config.host);
            let ((connector, check), name) = match connector.and_then(|c| name.map(|n| (c, n))) {
                Ok(parts) => parts,
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            };
            let result = guarded(
                &self.cancel,
                self.deadline,
                "TLS handshake",
                step,
                SmtpStream::implicit_tls(transport, &connector, name),
            )
            .await;
            let stream = match result {
                Ok(stream) => stream,
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            };
            self.record_tls(&stream, &check);
            stream
        } else {
            SmtpStream::plain(transport)
        };

        let result = guarded(
            &self.cancel,
            self.deadline,
            "banner",
            step,
            stream.read_reply(),
        )
        .await;
        self.stream = Some(stream);
        let banner = self.settle(result)?;
        log_reply(&banner);

        if !banner.is_success() {
            self.close().await;
            return Err(Error::Connection(format!(
                "server rejected connection: {} {}",
                banner.code,
                banner.message()
            )));
        }

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            security = %self.config.security,
            banner = %banner.first_line(),
            "connected"
        );
        self.phase = if self.tls.is_some() {
            SessionPhase::TlsEstablished
        } else {
            SessionPhase::Connected
        };
        self.needs_ehlo = true;
        Ok(self.banner.insert(banner))
    }

    /// Sends EHLO and rebuilds the capability set.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the reply is not 2xx.
    pub async fn ehlo(&mut self) -> Result<&Capabilities> {
        self.ensure_open("EHLO")?;
        let cmd = Command::Ehlo {
            hostname: self.config.local_name.clone(),
        };
        let reply = self.command(&cmd, "EHLO").await?;
        if !reply.is_success() {
            return Err(Error::unexpected_reply(
                cmd.redacted(),
                reply.code.as_u16(),
                reply.message(),
            ));
        }

        self.capabilities = Capabilities::from_ehlo_lines(&reply.lines);
        self.needs_ehlo = false;
        tracing::debug!(capabilities = %self.capabilities, "EHLO accepted");
        Ok(&self.capabilities)
    }

    /// Upgrades the connection with STARTTLS.
    ///
    /// Nothing is written if the server did not advertise STARTTLS. After
    /// success the capability set is cleared and EHLO must be sent again.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` if STARTTLS was not advertised, a protocol
    /// error if the server refuses it, and a TLS error if the handshake fails.
    pub async fn starttls(&mut self) -> Result<&TlsSnapshot> {
        self.ensure_greeted("STARTTLS")?;
        if self.tls.is_some() {
            return Err(Error::InvalidState("TLS is already established".into()));
        }
        if !self.capabilities.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let (connector, check) = self.config.tls.connector_with_check()?;
        let name = self.config.tls.server_name(&self.config.host)?;

        let reply = self.command(&Command::StartTls, "STARTTLS").await?;
        if !reply.is_success() {
            return Err(Error::unexpected_reply(
                "STARTTLS",
                reply.code.as_u16(),
                reply.message(),
            ));
        }

        let Some(stream) = self.stream.take() else {
            self.abort();
            return Err(Error::InvalidState("STARTTLS without a transport".into()));
        };
        let result = guarded(
            &self.cancel,
            self.deadline,
            "TLS handshake",
            self.config.timeouts.connect,
            stream.upgrade_to_tls(&connector, name),
        )
        .await;
        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                self.abort();
                return Err(err);
            }
        };

        self.record_tls(&stream, &check);
        self.stream = Some(stream);
        self.phase = SessionPhase::TlsEstablished;
        self.capabilities = Capabilities::default();
        self.needs_ehlo = true;

        self.tls
            .as_ref()
            .ok_or_else(|| Error::Tls("handshake completed without connection state".into()))
    }

    /// Authenticates with the first compatible mechanism from `requested`.
    ///
    /// `requested` holds mechanism names or `"auto"`. Errors never contain
    /// the password or token.
    ///
    /// # Errors
    ///
    /// Returns an auth error if no mechanism is compatible, a required
    /// secret is missing, or the server rejects the credentials.
    pub async fn auth<R: AsRef<str>>(
        &mut self,
        credentials: &Credentials,
        requested: &[R],
    ) -> Result<AuthMechanism> {
        self.ensure_greeted("AUTH")?;
        if self.authenticated {
            return Err(Error::InvalidState("already authenticated".into()));
        }

        let available = self.capabilities.auth_mechanisms();
        let Some(mechanism) = select_mechanism(requested, &available, credentials.has_token())
        else {
            let requested: Vec<&str> = requested.iter().map(AsRef::as_ref).collect();
            return Err(Error::auth(
                None,
                None,
                format!(
                    "no compatible mechanism (requested: {}, available: {})",
                    requested.join(", "),
                    if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    }
                ),
            ));
        };

        tracing::debug!(mechanism = %mechanism, "authenticating");
        let result = self.run_mechanism(mechanism, credentials).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(Error::Auth {
                mechanism,
                code,
                message,
            }) => {
                return Err(Error::Auth {
                    mechanism,
                    code,
                    message: scrub(message, credentials),
                });
            }
            Err(err) => return Err(err),
        };

        if reply.code == ReplyCode::AUTH_SUCCEEDED || reply.is_success() {
            self.authenticated = true;
            self.phase = SessionPhase::Authenticated;
            tracing::info!(mechanism = %mechanism, "authenticated");
            Ok(mechanism)
        } else {
            Err(Error::auth(
                Some(mechanism.as_str()),
                Some(reply.code.as_u16()),
                scrub(reply.message(), credentials),
            ))
        }
    }

    async fn run_mechanism(
        &mut self,
        mechanism: AuthMechanism,
        credentials: &Credentials,
    ) -> Result<Reply> {
        let name = Some(mechanism.as_str());
        let user = credentials.username.as_str();
        let missing = |what: &str| Error::auth(name, None, format!("{mechanism} requires {what}"));

        match mechanism {
            AuthMechanism::Plain => {
                let password = credentials
                    .password
                    .as_deref()
                    .ok_or_else(|| missing("a password"))?;
                let payload = sasl::plain_response(user, password);
                let reply = self
                    .command(
                        &Command::Auth {
                            mechanism,
                            initial_response: Some(payload.clone()),
                        },
                        "AUTH",
                    )
                    .await?;
                if reply.is_intermediate() {
                    return self.command(&Command::SaslResponse(payload), "AUTH").await;
                }
                Ok(reply)
            }
            AuthMechanism::Login => {
                let password = credentials
                    .password
                    .as_deref()
                    .ok_or_else(|| missing("a password"))?;
                let mut reply = self
                    .command(
                        &Command::Auth {
                            mechanism,
                            initial_response: None,
                        },
                        "AUTH",
                    )
                    .await?;
                // 334 Username: then 334 Password:
                for answer in [user, password] {
                    if !reply.is_intermediate() {
                        break;
                    }
                    reply = self
                        .command(&Command::SaslResponse(sasl::login_response(answer)), "AUTH")
                        .await?;
                }
                Ok(reply)
            }
            AuthMechanism::XOAuth2 | AuthMechanism::OAuthBearer => {
                let token = credentials
                    .access_token
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| missing("an access token"))?;
                let (payload, abort) = if mechanism == AuthMechanism::XOAuth2 {
                    (sasl::xoauth2_response(user, token), "")
                } else {
                    (sasl::oauthbearer_response(user, token), sasl::OAUTHBEARER_ABORT)
                };

                let reply = self
                    .command(
                        &Command::Auth {
                            mechanism,
                            initial_response: Some(payload),
                        },
                        "AUTH",
                    )
                    .await?;
                if !reply.is_intermediate() {
                    return Ok(reply);
                }

                // 334 carries a base64 JSON error; acknowledge it to get the final reply.
                let detail = sasl::OAuthError::from_challenge(reply.first_line());
                let last = self
                    .command(&Command::SaslResponse(abort.to_string()), "AUTH")
                    .await?;
                match detail {
                    Some(detail) if !last.is_success() => Err(Error::auth(
                        name,
                        Some(last.code.as_u16()),
                        format!("{} ({detail})", last.message()),
                    )),
                    _ => Ok(last),
                }
            }
        }
    }

    /// Runs one mail transaction and returns the server's final reply.
    ///
    /// `message` is the complete RFC 5322 message; it is dot-stuffed and
    /// terminated here. Recipients are tried in order and the first
    /// rejection stops the transaction before DATA.
    ///
    /// # Errors
    ///
    /// Returns `RecipientRejected` naming the refused recipient,
    /// `MessageTooLarge` if the server's SIZE limit is exceeded, and a
    /// protocol error for any other non-success reply.
    pub async fn send_mail(
        &mut self,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<Reply> {
        self.ensure_greeted("MAIL FROM")?;
        if recipients.is_empty() {
            return Err(Error::InvalidAddress("at least one recipient is required".into()));
        }

        // SIZE is checked and declared against the bytes actually sent.
        let mut payload = dot_stuff(message);
        if !payload.is_empty() && !payload.ends_with(b"\r\n") {
            payload.extend_from_slice(b"\r\n");
        }
        let size = payload.len();
        if let Some(limit) = self.capabilities.max_message_size() {
            if size > limit {
                return Err(Error::MessageTooLarge { size, limit });
            }
        }

        let mail_from = Command::MailFrom {
            from: from.clone(),
            size: self.capabilities.supports("SIZE").then_some(size),
            eight_bit: self.capabilities.supports("8BITMIME") && !message.is_ascii(),
        };
        let reply = self.command(&mail_from, "MAIL FROM").await?;
        if !reply.is_success() {
            return Err(Error::unexpected_reply(
                mail_from.redacted(),
                reply.code.as_u16(),
                reply.message(),
            ));
        }

        for to in recipients {
            let reply = self
                .command(&Command::RcptTo { to: to.clone() }, "RCPT TO")
                .await?;
            if !reply.is_success() {
                tracing::warn!(recipient = %to, code = reply.code.as_u16(), "recipient rejected");
                return Err(Error::RecipientRejected {
                    recipient: to.to_string(),
                    code: reply.code.as_u16(),
                    message: reply.message(),
                });
            }
        }

        let reply = self.command(&Command::Data, "DATA").await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::unexpected_reply(
                "DATA",
                reply.code.as_u16(),
                reply.message(),
            ));
        }

        payload.extend_from_slice(b".\r\n");

        tracing::debug!(target: WIRE_TARGET, ">>> [{} bytes of message data]", payload.len());
        let reply = self
            .exchange(&payload, "message data", self.config.timeouts.data)
            .await?;
        if !reply.is_success() {
            return Err(Error::unexpected_reply(
                "end of data",
                reply.code.as_u16(),
                reply.message(),
            ));
        }

        tracing::info!(recipients = recipients.len(), reply = %reply, "message accepted");
        Ok(reply)
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the reply is not 2xx.
    pub async fn noop(&mut self) -> Result<Reply> {
        self.simple(Command::Noop, "NOOP").await
    }

    /// Sends RSET, abandoning the current mail transaction.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the reply is not 2xx.
    pub async fn reset(&mut self) -> Result<Reply> {
        self.simple(Command::Rset, "RSET").await
    }

    /// Sends QUIT (best effort) and drops the transport. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let step = self.config.timeouts.command.min(QUIT_TIMEOUT);
            log_command(&Command::Quit);
            let result = guarded(&self.cancel, None, "QUIT", step, async {
                stream.write_all(&Command::Quit.serialize()).await?;
                let reply = stream.read_reply().await;
                let _ = stream.shutdown().await;
                reply
            })
            .await;
            match result {
                Ok(reply) => log_reply(&reply),
                Err(err) => tracing::debug!(error = %err, "QUIT failed"),
            }
        }
        self.phase = SessionPhase::Closed;
    }

    async fn simple(&mut self, cmd: Command, operation: &'static str) -> Result<Reply> {
        self.ensure_open(operation)?;
        let reply = self.command(&cmd, operation).await?;
        if !reply.is_success() {
            return Err(Error::unexpected_reply(
                operation,
                reply.code.as_u16(),
                reply.message(),
            ));
        }
        Ok(reply)
    }

    fn record_tls(&mut self, stream: &SmtpStream<S>, check: &ChainCheck) {
        if let Some(conn) = stream.tls_connection() {
            let snapshot =
                TlsSnapshot::capture(conn, self.config.tls_server_name(), check.status());
            tracing::info!(
                version = %snapshot.info.version,
                cipher = %snapshot.info.cipher_suite,
                "TLS established"
            );
            self.tls = Some(snapshot);
        }
    }

    async fn command(&mut self, cmd: &Command, operation: &'static str) -> Result<Reply> {
        log_command(cmd);
        self.exchange(&cmd.serialize(), operation, self.config.timeouts.command)
            .await
    }

    async fn exchange(
        &mut self,
        bytes: &[u8],
        operation: &'static str,
        step: Duration,
    ) -> Result<Reply> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::InvalidState(format!("{operation} without a transport")));
        };
        let result = guarded(&self.cancel, self.deadline, operation, step, async {
            stream.write_all(bytes).await?;
            stream.read_reply().await
        })
        .await;
        let reply = self.settle(result)?;
        log_reply(&reply);
        Ok(reply)
    }
}

impl Session<TcpStream> {
    /// Dials the server (through the proxy, if configured) and runs the
    /// connect sequence.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the dial, proxy negotiation or banner
    /// fails, and a TLS error if the implicit-TLS handshake fails.
    pub async fn connect(&mut self) -> Result<&Reply> {
        if self.phase != SessionPhase::Disconnected {
            return Err(Error::InvalidState("session already connected".into()));
        }
        self.start_budget();
        let step = self.config.timeouts.connect;
        let host = self.config.host.clone();
        let port = self.config.port;

        let (dial_host, dial_port) = self
            .config
            .proxy
            .as_ref()
            .map_or_else(|| (host.clone(), port), proxy::ProxyConfig::address);
        tracing::debug!(host = %dial_host, port = dial_port, "dialing");

        let proxy = self.config.proxy.clone();
        let result = guarded(&self.cancel, self.deadline, "connect", step, async {
            let mut tcp = TcpStream::connect((dial_host.as_str(), dial_port))
                .await
                .map_err(|e| {
                    Error::Connection(format!("failed to connect to {dial_host}:{dial_port}: {e}"))
                })?;
            if let Some(proxy) = &proxy {
                proxy::establish(&mut tcp, proxy, &host, port).await?;
            }
            Ok(tcp)
        })
        .await;

        match result {
            Ok(tcp) => self.connect_with(tcp).await,
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }
}

/// Runs `fut` under `min(step, remaining budget)` and races cancellation.
async fn guarded<T, F>(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    operation: &'static str,
    step: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let limit = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout {
                    operation,
                    after: Duration::ZERO,
                });
            }
            step.min(remaining)
        }
        None => step,
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled(operation)),
        result = tokio::time::timeout(limit, fut) => result.unwrap_or_else(|_| {
            Err(Error::Timeout { operation, after: limit })
        }),
    }
}

fn scrub(message: String, credentials: &Credentials) -> String {
    credentials
        .secrets()
        .fold(message, |msg, secret| msg.replace(secret, "****"))
}

fn log_command(cmd: &Command) {
    tracing::debug!(target: WIRE_TARGET, ">>> {}", cmd.redacted());
}

fn log_reply(reply: &Reply) {
    for line in reply.wire_lines() {
        tracing::debug!(target: WIRE_TARGET, "<<< {line}");
    }
}
