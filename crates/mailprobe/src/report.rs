//! TLS report rendering and TLS log columns.

use std::fmt::Write as _;

use mailprobe_smtp::TlsSnapshot;
use mailprobe_smtp::tls::recommendations;

/// Values for the `TLS_Version` .. `Cert_Verification_Status` log columns;
/// all empty without TLS.
#[must_use]
pub fn tls_columns(tls: Option<&TlsSnapshot>) -> [String; 9] {
    let Some(tls) = tls else {
        return Default::default();
    };
    let mut values: [String; 9] = Default::default();
    values[0].clone_from(&tls.info.version);
    values[1].clone_from(&tls.info.cipher_suite);
    values[2] = tls.info.strength.as_str().to_string();
    if let Some(cert) = &tls.certificate {
        values[3].clone_from(&cert.subject);
        values[4].clone_from(&cert.issuer);
        values[5] = cert.sans.join(";");
        values[6] = cert.valid_from.to_rfc3339();
        values[7] = cert.valid_to.to_rfc3339();
        values[8] = cert.verification.as_str().to_string();
    }
    values
}

fn section(out: &mut String, title: &str, body: impl FnOnce(&mut String)) {
    let rule = "═".repeat(60);
    let _ = writeln!(out, "\n{title}:");
    let _ = writeln!(out, "{rule}");
    body(out);
    let _ = writeln!(out, "{rule}");
}

/// Multi-section human-readable TLS report.
#[must_use]
pub fn tls_report(tls: &TlsSnapshot, skip_verify: bool) -> String {
    let mut out = String::new();
    let info = &tls.info;

    section(&mut out, "TLS Connection Details", |out| {
        let _ = writeln!(out, "  Protocol Version:    {}", info.version);
        let _ = writeln!(out, "  Cipher Suite:        {}", info.cipher_suite);
        let _ = writeln!(
            out,
            "  Cipher Strength:     {}",
            info.strength.as_str().to_ascii_uppercase()
        );
        if !info.server_name.is_empty() {
            let _ = writeln!(out, "  Server Name (SNI):   {}", info.server_name);
        }
        if let Some(alpn) = &info.alpn {
            let _ = writeln!(out, "  Negotiated Protocol: {alpn}");
        }
    });

    if let Some(cert) = &tls.certificate {
        section(&mut out, "Certificate Information", |out| {
            let _ = writeln!(out, "  Subject:             {}", cert.subject);
            let _ = writeln!(out, "  Issuer:              {}", cert.issuer);
            let _ = writeln!(out, "  Serial Number:       {}", cert.serial_number);
            let _ = writeln!(
                out,
                "  Valid From:          {}",
                cert.valid_from.format("%Y-%m-%d %H:%M:%S UTC")
            );
            let _ = writeln!(
                out,
                "  Valid To:            {}",
                cert.valid_to.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if cert.is_expired {
                let _ = writeln!(out, "  Status:              ⚠ EXPIRED");
            } else {
                let _ = writeln!(out, "  Days Until Expiry:   {}", cert.days_until_expiry);
            }
            if cert.sans.is_empty() {
                let _ = writeln!(out, "  Subject Alternative Names: None");
            } else {
                let _ = writeln!(out, "  Subject Alternative Names:");
                for san in &cert.sans {
                    let _ = writeln!(out, "    • {san}");
                }
            }
            let _ = writeln!(out, "  Signature Algorithm: {}", cert.signature_algorithm);
            let _ = writeln!(
                out,
                "  Public Key:          {} ({} bits)",
                cert.public_key_algorithm, cert.public_key_bits
            );
            if !cert.key_usage.is_empty() {
                let _ = writeln!(out, "  Key Usage:           {}", cert.key_usage.join(", "));
            }
            if !cert.ext_key_usage.is_empty() {
                let _ = writeln!(
                    out,
                    "  Extended Key Usage:  {}",
                    cert.ext_key_usage.join(", ")
                );
            }
            let _ = writeln!(
                out,
                "  Verification:        {}",
                cert.verification.as_str().to_ascii_uppercase()
            );
            let _ = writeln!(
                out,
                "  Chain Length:        {} certificate(s)",
                cert.chain_length
            );
            if cert.is_self_signed {
                let _ = writeln!(out, "  ⚠ Self-signed certificate");
            }
        });
    }

    let warnings = tls.warnings(skip_verify);
    if !warnings.is_empty() {
        section(&mut out, "Security Warnings", |out| {
            for warning in &warnings {
                let _ = writeln!(out, "  ⚠ {warning}");
            }
        });
    }

    let advice = recommendations(info);
    if !advice.is_empty() {
        section(&mut out, "Recommendations", |out| {
            for item in &advice {
                let _ = writeln!(out, "  • {item}");
            }
        });
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mailprobe_smtp::{CertificateInfo, CipherStrength, TlsInfo, VerificationStatus};

    fn snapshot(with_cert: bool) -> TlsSnapshot {
        let info = TlsInfo {
            version: "TLS 1.2".to_string(),
            cipher_suite: "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256".to_string(),
            strength: CipherStrength::Moderate,
            server_name: "smtp.example.com".to_string(),
            alpn: None,
        };
        let certificate = with_cert.then(|| CertificateInfo {
            subject: "CN=smtp.example.com".to_string(),
            issuer: "CN=Example CA".to_string(),
            serial_number: "0a:1b".to_string(),
            sans: vec![
                "smtp.example.com".to_string(),
                "mail.example.com".to_string(),
            ],
            valid_from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            valid_to: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            days_until_expiry: 1000,
            is_expired: false,
            is_self_signed: false,
            signature_algorithm: "SHA256-RSA".to_string(),
            public_key_algorithm: "RSA".to_string(),
            public_key_bits: 2048,
            key_usage: vec![],
            ext_key_usage: vec!["Server Authentication".to_string()],
            verification: VerificationStatus::Verified,
            chain_length: 2,
        });
        TlsSnapshot { info, certificate }
    }

    #[test]
    fn test_columns_without_tls() {
        assert!(tls_columns(None).iter().all(String::is_empty));
    }

    #[test]
    fn test_columns_with_certificate() {
        let snap = snapshot(true);
        let values = tls_columns(Some(&snap));
        assert_eq!(values[0], "TLS 1.2");
        assert_eq!(values[2], CipherStrength::Moderate.as_str());
        assert_eq!(values[5], "smtp.example.com;mail.example.com");
        assert_eq!(values[6], "2024-01-01T00:00:00+00:00");
        assert_eq!(values[8], "verified");
    }

    #[test]
    fn test_columns_without_certificate() {
        let snap = snapshot(false);
        let values = tls_columns(Some(&snap));
        assert_eq!(values[1], "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256");
        assert!(values[3..].iter().all(String::is_empty));
    }

    #[test]
    fn test_report_sections() {
        let report = tls_report(&snapshot(true), true);
        for title in [
            "TLS Connection Details:",
            "Certificate Information:",
            "Security Warnings:",
            "Recommendations:",
        ] {
            assert!(report.contains(title), "missing {title}");
        }
        assert!(report.contains(&"═".repeat(60)));
        assert!(report.contains("    • mail.example.com"));
        assert!(report.contains("--skip-verify"));
    }
}
