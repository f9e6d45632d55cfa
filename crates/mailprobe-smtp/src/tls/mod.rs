//! TLS client settings, connector construction and session snapshots.

mod analyzer;

pub use analyzer::{
    CertificateInfo, CipherStrength, TlsInfo, VerificationStatus, check_warnings,
    recommendations,
};

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Display name, e.g. `"TLS 1.3"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tls12 => "TLS 1.2",
            Self::Tls13 => "TLS 1.3",
        }
    }

    const fn rustls(self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', 'v'], "");
        match normalized.trim_start_matches("tls") {
            "1.2" => Ok(Self::Tls12),
            "1.3" => Ok(Self::Tls13),
            _ => Err(Error::Config(format!(
                "unsupported TLS version {s:?} (expected 1.2 or 1.3)"
            ))),
        }
    }
}

/// Which protocol versions the handshake may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersionPolicy {
    /// The given version or anything newer.
    Minimum(TlsVersion),
    /// Exactly the given version.
    Exact(TlsVersion),
}

impl Default for TlsVersionPolicy {
    fn default() -> Self {
        Self::Minimum(TlsVersion::Tls12)
    }
}

impl TlsVersionPolicy {
    fn protocol_versions(self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        let allowed = |v: TlsVersion| match self {
            Self::Minimum(min) => v >= min,
            Self::Exact(exact) => v == exact,
        };
        [TlsVersion::Tls13, TlsVersion::Tls12]
            .into_iter()
            .filter(|v| allowed(*v))
            .map(TlsVersion::rustls)
            .collect()
    }
}

impl fmt::Display for TlsVersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimum(v) => write!(f, ">= {v}"),
            Self::Exact(v) => write!(f, "= {v}"),
        }
    }
}

/// Client-side TLS settings shared by implicit TLS and STARTTLS.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// SNI / verification name. Defaults to the session host.
    pub server_name: Option<String>,
    /// Accept any server certificate. The chain is still checked and the
    /// outcome reported; handshake signatures are still verified.
    pub skip_verify: bool,
    /// Protocol version policy.
    pub version: TlsVersionPolicy,
    /// Trust anchors added to the bundled web PKI roots.
    pub extra_roots: Vec<CertificateDer<'static>>,
}

impl TlsSettings {
    /// Builds a connector and the handle that reports how its handshake
    /// verified the server certificate. Fails if the version policy or a
    /// trust anchor is rejected.
    ///
    /// With `skip_verify` the presented chain is still checked against the
    /// trust store and the name; the outcome is recorded and the handshake
    /// continues either way.
    pub(crate) fn connector_with_check(&self) -> Result<(TlsConnector, ChainCheck)> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&self.version.protocol_versions())
            .map_err(|e| Error::Tls(format!("invalid TLS version policy {}: {e}", self.version)))?;
        let roots = self.root_store()?;

        let (config, check) = if self.skip_verify {
            let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| Error::Tls(format!("cannot build certificate verifier: {e}")))?;
            let outcome = Arc::new(OnceLock::new());
            let verifier = RecordingVerifier {
                inner,
                outcome: Arc::clone(&outcome),
            };
            let config = builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(verifier))
                .with_no_client_auth();
            (config, ChainCheck(Some(outcome)))
        } else {
            let config = builder.with_root_certificates(roots).with_no_client_auth();
            (config, ChainCheck(None))
        };

        Ok((TlsConnector::from(Arc::new(config)), check))
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        for cert in &self.extra_roots {
            roots
                .add(cert.clone())
                .map_err(|e| Error::Tls(format!("invalid trust anchor: {e}")))?;
        }
        Ok(roots)
    }

    /// Resolves the name sent as SNI and checked against the certificate.
    ///
    /// # Errors
    ///
    /// Returns a TLS error if the name is neither a DNS name nor an IP address.
    pub fn server_name(&self, host: &str) -> Result<ServerName<'static>> {
        let name = self.server_name.as_deref().unwrap_or(host);
        ServerName::try_from(name.to_string())
            .map_err(|_| Error::Tls(format!("invalid server name: {name}")))
    }
}

/// How the certificate of one handshake was verified.
#[derive(Debug, Clone)]
pub(crate) struct ChainCheck(Option<Arc<OnceLock<bool>>>);

impl ChainCheck {
    /// Verification status after the handshake completed.
    ///
    /// A verifying connector only completes handshakes with a valid chain.
    pub(crate) fn status(&self) -> VerificationStatus {
        match &self.0 {
            None => VerificationStatus::Verified,
            Some(outcome) => match outcome.get() {
                Some(true) => VerificationStatus::Verified,
                Some(false) => VerificationStatus::Failed,
                None => VerificationStatus::Skipped,
            },
        }
    }
}

/// TLS state captured right after a handshake.
#[derive(Debug, Clone)]
pub struct TlsSnapshot {
    /// Negotiated parameters.
    pub info: TlsInfo,
    /// Leaf certificate details, if the chain could be parsed.
    pub certificate: Option<CertificateInfo>,
}

impl TlsSnapshot {
    /// Captures the state of an established client connection.
    #[must_use]
    pub fn capture(
        conn: &rustls::ClientConnection,
        server_name: &str,
        verification: VerificationStatus,
    ) -> Self {
        let info = TlsInfo::from_connection(conn, server_name);
        let certificate = conn.peer_certificates().and_then(|chain| {
            CertificateInfo::from_chain(chain, verification, Utc::now())
                .inspect_err(|e| tracing::warn!(error = %e, "could not parse peer certificate"))
                .ok()
        });
        Self { info, certificate }
    }

    /// Security warnings for this handshake.
    #[must_use]
    pub fn warnings(&self, skip_verify: bool) -> Vec<String> {
        check_warnings(Some(&self.info), self.certificate.as_ref(), skip_verify)
    }
}

/// Accepts any certificate chain after recording whether the web PKI
/// verifier would have accepted it. Handshake signatures are still checked.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    outcome: Arc<OnceLock<bool>>,
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let result = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        );
        if let Err(err) = &result {
            tracing::warn!(error = %err, "certificate not trusted, accepting it anyway");
        }
        let _ = self.outcome.set(result.is_ok());
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!("1.2".parse::<TlsVersion>().unwrap(), TlsVersion::Tls12);
        assert_eq!("TLS1.3".parse::<TlsVersion>().unwrap(), TlsVersion::Tls13);
        assert_eq!("tlsv1.3".parse::<TlsVersion>().unwrap(), TlsVersion::Tls13);
        assert!("1.1".parse::<TlsVersion>().is_err());
    }

    #[test]
    fn minimum_policy_allows_newer_versions() {
        let versions = TlsVersionPolicy::Minimum(TlsVersion::Tls12).protocol_versions();
        assert_eq!(versions.len(), 2);

        let versions = TlsVersionPolicy::Minimum(TlsVersion::Tls13).protocol_versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, rustls::ProtocolVersion::TLSv1_3);
    }

    #[test]
    fn exact_policy_pins_one_version() {
        let versions = TlsVersionPolicy::Exact(TlsVersion::Tls12).protocol_versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, rustls::ProtocolVersion::TLSv1_2);
    }

    #[test]
    fn default_policy_is_tls12_floor() {
        assert_eq!(
            TlsVersionPolicy::default(),
            TlsVersionPolicy::Minimum(TlsVersion::Tls12)
        );
    }

    #[test]
    fn connectors_build_for_every_mode() {
        for skip_verify in [false, true] {
            for version in [
                TlsVersionPolicy::default(),
                TlsVersionPolicy::Exact(TlsVersion::Tls13),
            ] {
                let settings = TlsSettings {
                    skip_verify,
                    version,
                    ..TlsSettings::default()
                };
                assert!(settings.connector_with_check().is_ok());
            }
        }
    }

    #[test]
    fn server_name_override() {
        let settings = TlsSettings {
            server_name: Some("mx.example.com".into()),
            ..TlsSettings::default()
        };
        let name = settings.server_name("192.0.2.10").unwrap();
        assert_eq!(name.to_str(), "mx.example.com");

        let ip = TlsSettings::default().server_name("192.0.2.10").unwrap();
        assert!(matches!(ip, ServerName::IpAddress(_)));
    }

    #[test]
    fn chain_check_status() {
        let (_, check) = TlsSettings::default().connector_with_check().unwrap();
        assert_eq!(check.status(), VerificationStatus::Verified);

        let settings = TlsSettings {
            skip_verify: true,
            ..TlsSettings::default()
        };
        let (_, check) = settings.connector_with_check().unwrap();
        assert_eq!(check.status(), VerificationStatus::Skipped);

        let outcome = Arc::new(OnceLock::new());
        let check = ChainCheck(Some(Arc::clone(&outcome)));
        outcome.set(false).unwrap();
        assert_eq!(check.status(), VerificationStatus::Failed);
    }
}
