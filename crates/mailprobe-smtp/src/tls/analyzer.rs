//! Point-in-time TLS and certificate snapshots, security warnings and
//! recommendations. Nothing here performs I/O.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{X509Certificate, parse_x509_certificate};
use x509_parser::public_key::PublicKey;

use crate::error::{Error, Result};

/// Days before expiry at which a certificate is flagged.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

/// Coarse strength classification of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CipherStrength {
    /// Broken or export-grade primitives.
    Weak,
    /// Acceptable but not preferred (CBC modes, 128-bit TLS 1.2 suites).
    Moderate,
    /// AEAD with a strong key.
    Strong,
}

impl CipherStrength {
    /// Classifies an IANA cipher suite name.
    #[must_use]
    pub fn classify(suite: &str) -> Self {
        const WEAK: [&str; 6] = ["NULL", "RC4", "DES", "EXPORT", "MD5", "ANON"];
        let name = suite.to_ascii_uppercase();

        if WEAK.iter().any(|marker| name.contains(marker)) {
            Self::Weak
        } else if name.starts_with("TLS13_") || name.starts_with("TLS_AES_") {
            Self::Strong
        } else if name.contains("CBC") {
            Self::Moderate
        } else if name.contains("AES_256_GCM") || name.contains("CHACHA20") {
            Self::Strong
        } else {
            Self::Moderate
        }
    }

    /// Lower-case label, e.g. `"strong"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }
}

impl fmt::Display for CipherStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of certificate chain verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    /// Chain verified against the trust store.
    Verified,
    /// Verification failed.
    Failed,
    /// Verification was disabled by the operator.
    Skipped,
}

impl VerificationStatus {
    /// Lower-case label, e.g. `"verified"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiated TLS parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// Protocol version, e.g. `"TLS 1.3"`.
    pub version: String,
    /// IANA cipher suite name.
    pub cipher_suite: String,
    /// Strength of `cipher_suite`.
    pub strength: CipherStrength,
    /// SNI name that was sent.
    pub server_name: String,
    /// ALPN protocol, if one was negotiated.
    pub alpn: Option<String>,
}

impl TlsInfo {
    /// Builds a snapshot from raw values.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        cipher_suite: impl Into<String>,
        server_name: impl Into<String>,
        alpn: Option<String>,
    ) -> Self {
        let cipher_suite = cipher_suite.into();
        Self {
            version: version.into(),
            strength: CipherStrength::classify(&cipher_suite),
            cipher_suite,
            server_name: server_name.into(),
            alpn,
        }
    }

    /// Reads the negotiated parameters of an established connection.
    #[must_use]
    pub fn from_connection(conn: &rustls::ClientConnection, server_name: &str) -> Self {
        let version = match conn.protocol_version() {
            Some(rustls::ProtocolVersion::TLSv1_3) => "TLS 1.3".to_string(),
            Some(rustls::ProtocolVersion::TLSv1_2) => "TLS 1.2".to_string(),
            Some(other) => format!("{other:?}"),
            None => "unknown".to_string(),
        };
        let cipher_suite = conn
            .negotiated_cipher_suite()
            .map_or_else(|| "unknown".to_string(), |s| format!("{:?}", s.suite()));
        let alpn = conn
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned());

        Self::new(version, cipher_suite, server_name, alpn)
    }

    /// True for TLS 1.2 and 1.3.
    #[must_use]
    pub fn is_modern_version(&self) -> bool {
        matches!(self.version.as_str(), "TLS 1.2" | "TLS 1.3")
    }
}

/// Leaf certificate details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Serial number, colon-separated hex.
    pub serial_number: String,
    /// Subject alternative names.
    pub sans: Vec<String>,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_to: DateTime<Utc>,
    /// Whole days from `now` until `valid_to` (negative once expired).
    pub days_until_expiry: i64,
    /// `now` is past `valid_to`.
    pub is_expired: bool,
    /// Subject and issuer are identical.
    pub is_self_signed: bool,
    /// Signature algorithm name.
    pub signature_algorithm: String,
    /// Public key algorithm name.
    pub public_key_algorithm: String,
    /// Public key size in bits.
    pub public_key_bits: usize,
    /// Key usage flags.
    pub key_usage: Vec<String>,
    /// Extended key usage purposes.
    pub ext_key_usage: Vec<String>,
    /// Verification outcome.
    pub verification: VerificationStatus,
    /// Number of certificates the server presented.
    pub chain_length: usize,
}

impl CertificateInfo {
    /// Analyzes the leaf of a peer chain at time `now`.
    ///
    /// # Errors
    ///
    /// Returns a TLS error if the chain is empty or the leaf is not valid DER.
    pub fn from_chain(
        chain: &[CertificateDer<'_>],
        verification: VerificationStatus,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let leaf = chain
            .first()
            .ok_or_else(|| Error::Tls("server presented no certificate".into()))?;
        let (_, cert) = parse_x509_certificate(leaf.as_ref())
            .map_err(|e| Error::Tls(format!("failed to parse certificate: {e}")))?;

        let valid_from = to_utc(cert.validity().not_before.timestamp())?;
        let valid_to = to_utc(cert.validity().not_after.timestamp())?;
        let (public_key_algorithm, public_key_bits) = public_key_details(&cert);

        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial_number: cert.raw_serial_as_string(),
            sans: subject_alt_names(&cert),
            valid_from,
            valid_to,
            days_until_expiry: (valid_to - now).num_days(),
            is_expired: now > valid_to,
            is_self_signed: cert.subject().as_raw() == cert.issuer().as_raw(),
            signature_algorithm: signature_algorithm_name(
                &cert.signature_algorithm.algorithm.to_id_string(),
            ),
            public_key_algorithm,
            public_key_bits,
            key_usage: key_usage(&cert),
            ext_key_usage: ext_key_usage(&cert),
            verification,
            chain_length: chain.len(),
        })
    }
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| Error::Tls(format!("certificate time out of range: {timestamp}")))
}

fn subject_alt_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let Ok(Some(ext)) = cert.subject_alternative_name() else {
        return Vec::new();
    };
    ext.value
        .general_names
        .iter()
        .map(|name| match name {
            GeneralName::DNSName(dns) => (*dns).to_string(),
            GeneralName::RFC822Name(email) => (*email).to_string(),
            GeneralName::URI(uri) => (*uri).to_string(),
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes),
            other => other.to_string(),
        })
        .collect()
}

fn ip_from_bytes(bytes: &[u8]) -> String {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).map_or_else(
            |_| format!("{bytes:02x?}"),
            |octets| IpAddr::from(octets).to_string(),
        ),
        16 => <[u8; 16]>::try_from(bytes).map_or_else(
            |_| format!("{bytes:02x?}"),
            |octets| IpAddr::from(octets).to_string(),
        ),
        _ => format!("{bytes:02x?}"),
    }
}

fn public_key_details(cert: &X509Certificate<'_>) -> (String, usize) {
    let spki = cert.public_key();
    let oid = spki.algorithm.algorithm.to_id_string();
    let algorithm = match oid.as_str() {
        "1.2.840.113549.1.1.1" => "RSA".to_string(),
        "1.2.840.10045.2.1" => "ECDSA".to_string(),
        "1.3.101.112" => "Ed25519".to_string(),
        "1.3.101.113" => "Ed448".to_string(),
        _ => oid,
    };
    let bits = match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => rsa.key_size(),
        Ok(PublicKey::EC(point)) => point.key_size(),
        _ if algorithm == "Ed25519" => 256,
        _ => spki.subject_public_key.data.len() * 8,
    };
    (algorithm, bits)
}

fn signature_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.5" => "SHA1-RSA",
        "1.2.840.113549.1.1.4" => "MD5-RSA",
        "1.2.840.113549.1.1.10" => "RSA-PSS",
        "1.2.840.113549.1.1.11" => "SHA256-RSA",
        "1.2.840.113549.1.1.12" => "SHA384-RSA",
        "1.2.840.113549.1.1.13" => "SHA512-RSA",
        "1.2.840.10045.4.1" => "ECDSA-SHA1",
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256",
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384",
        "1.2.840.10045.4.3.4" => "ECDSA-SHA512",
        "1.3.101.112" => "Ed25519",
        other => return other.to_string(),
    }
    .to_string()
}

fn key_usage(cert: &X509Certificate<'_>) -> Vec<String> {
    let Ok(Some(ext)) = cert.key_usage() else {
        return Vec::new();
    };
    let ku = ext.value;
    [
        (ku.digital_signature(), "Digital Signature"),
        (ku.non_repudiation(), "Content Commitment"),
        (ku.key_encipherment(), "Key Encipherment"),
        (ku.data_encipherment(), "Data Encipherment"),
        (ku.key_agreement(), "Key Agreement"),
        (ku.key_cert_sign(), "Certificate Sign"),
        (ku.crl_sign(), "CRL Sign"),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| name.to_string())
    .collect()
}

fn ext_key_usage(cert: &X509Certificate<'_>) -> Vec<String> {
    let Ok(Some(ext)) = cert.extended_key_usage() else {
        return Vec::new();
    };
    let eku = ext.value;
    let mut purposes: Vec<String> = [
        (eku.any, "Any"),
        (eku.server_auth, "Server Authentication"),
        (eku.client_auth, "Client Authentication"),
        (eku.code_signing, "Code Signing"),
        (eku.email_protection, "Email Protection"),
        (eku.time_stamping, "Time Stamping"),
        (eku.ocsp_signing, "OCSP Signing"),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| name.to_string())
    .collect();
    purposes.extend(eku.other.iter().map(|oid| oid.to_id_string()));
    purposes
}

/// Security warnings for a TLS session and its leaf certificate.
///
/// An expired certificate is reported as `EXPIRED` and never also as
/// expiring soon.
#[must_use]
pub fn check_warnings(
    tls: Option<&TlsInfo>,
    cert: Option<&CertificateInfo>,
    skip_verify: bool,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(tls) = tls {
        if !tls.is_modern_version() {
            warnings.push(format!("Legacy protocol version {} negotiated", tls.version));
        }
        if tls.strength == CipherStrength::Weak {
            warnings.push(format!("Weak cipher suite negotiated: {}", tls.cipher_suite));
        }
    }

    if let Some(cert) = cert {
        if cert.is_expired {
            warnings.push(format!(
                "Certificate EXPIRED on {}",
                cert.valid_to.format("%Y-%m-%d")
            ));
        } else if cert.days_until_expiry <= EXPIRY_WARNING_DAYS {
            warnings.push(format!(
                "Certificate expires in {} days ({})",
                cert.days_until_expiry,
                cert.valid_to.format("%Y-%m-%d")
            ));
        }
        if cert.is_self_signed {
            warnings.push("Self-signed certificate".to_string());
        }
        if cert.verification == VerificationStatus::Failed {
            warnings.push("Certificate verification failed".to_string());
        }
    }

    if skip_verify {
        warnings.push(
            "Certificate verification disabled (--skip-verify); the server identity is not checked"
                .to_string(),
        );
    }

    warnings
}

/// Configuration advice keyed off protocol version and cipher strength.
#[must_use]
pub fn recommendations(tls: &TlsInfo) -> Vec<String> {
    let mut advice = Vec::new();

    match tls.version.as_str() {
        "TLS 1.3" => {}
        "TLS 1.2" => advice.push("Consider enabling TLS 1.3 on the server".to_string()),
        _ => advice.push(
            "Upgrade the server to TLS 1.2 or later, ideally TLS 1.3".to_string(),
        ),
    }

    match tls.strength {
        CipherStrength::Strong => {}
        CipherStrength::Moderate => advice.push(
            "Prefer AEAD cipher suites (AES-256-GCM or ChaCha20-Poly1305)".to_string(),
        ),
        CipherStrength::Weak => advice.push(format!(
            "Disable weak cipher suite {} on the server",
            tls.cipher_suite
        )),
    }

    advice
}
