//! # mailprobe-smtp
//!
//! SMTP client session engine for diagnostics (RFC 5321).
//!
//! ## Features
//!
//! - **Session state machine**: connect, EHLO, STARTTLS, AUTH, mail
//!   transaction and QUIT with phase checks at every step
//! - **TLS**: implicit TLS (port 465) and STARTTLS, version pinning, and
//!   capture of the negotiated parameters and peer certificate
//! - **Authentication**: PLAIN, LOGIN, XOAUTH2, OAUTHBEARER with automatic
//!   mechanism selection
//! - **Proxies**: SOCKS5 and HTTP CONNECT tunnels
//! - **Deadlines**: per-step timeouts, an optional whole-session budget and
//!   cooperative cancellation
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_smtp::{Address, Credentials, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> mailprobe_smtp::Result<()> {
//!     let mut session = Session::new(SessionConfig::new("smtp.example.com"));
//!     session.connect().await?;
//!     session.ehlo().await?;
//!     session.starttls().await?;
//!     session.ehlo().await?;
//!
//!     let creds = Credentials::password("user@example.com", "secret");
//!     session.auth(&creds, &["auto"]).await?;
//!
//!     let from = Address::new("user@example.com")?;
//!     let to = Address::new("someone@example.org")?;
//!     session
//!         .send_mail(&from, &[to], b"Subject: hi\r\n\r\nHello\r\n")
//!         .await?;
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: mechanism selection and SASL encoders
//! - [`command`]: command serialization and dot-stuffing
//! - [`connection`]: configuration, transport and session
//! - [`parser`]: reply parser
//! - [`tls`]: TLS settings and connection analysis
//! - [`types`]: addresses, capabilities and replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod tls;
pub mod types;

pub use auth::{AuthMechanism, Credentials};
pub use connection::{
    ProxyConfig, ProxyKind, Security, Session, SessionConfig, SessionConfigBuilder, SessionPhase,
    Timeouts,
};
pub use error::{Error, ErrorKind, Result};
pub use tls::{
    CertificateInfo, CipherStrength, TlsInfo, TlsSettings, TlsSnapshot, TlsVersion,
    TlsVersionPolicy, VerificationStatus,
};
pub use types::{Address, Capabilities, Reply, ReplyCode};
