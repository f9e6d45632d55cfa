//! Operator input validation.

use std::net::IpAddr;

use thiserror::Error;

/// Maximum length of a DNS hostname.
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Validation error for operator-supplied values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("{field} cannot be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },
    /// An address lacks a local part, an `@` or a domain.
    #[error("{field} contains invalid email: {value}")]
    InvalidEmail {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// Hostname is too long, has an invalid character or a bad edge.
    #[error("invalid hostname {value:?}: {reason}")]
    InvalidHostname {
        /// Offending value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Port is zero.
    #[error("port must be between 1 and 65535 (got {0})")]
    InvalidPort(u32),
}

impl ValidationError {
    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Empty { field } | Self::InvalidEmail { field, .. } => field,
            Self::InvalidHostname { .. } => "host",
            Self::InvalidPort(_) => "port",
        }
    }
}

/// Checks that `email` has exactly one `@` with non-empty parts on both sides.
///
/// Surrounding angle brackets are accepted and ignored.
///
/// # Errors
///
/// Returns [`ValidationError`] if the address is empty or malformed.
pub fn validate_email(field: &'static str, email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    let email = email
        .strip_prefix('<')
        .and_then(|e| e.strip_suffix('>'))
        .unwrap_or(email);
    if email.is_empty() {
        return Err(ValidationError::Empty { field });
    }

    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(())
        }
        _ => Err(ValidationError::InvalidEmail {
            field,
            value: email.to_string(),
        }),
    }
}

/// Validates every address in `emails`; an empty list is an error.
///
/// # Errors
///
/// Returns the first failure.
pub fn validate_emails<S: AsRef<str>>(
    field: &'static str,
    emails: &[S],
) -> Result<(), ValidationError> {
    if emails.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    emails
        .iter()
        .try_for_each(|email| validate_email(field, email.as_ref()))
}

/// Accepts IPv4/IPv6 literals and DNS names of letters, digits, dots and hyphens.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first problem found.
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(ValidationError::Empty { field: "host" });
    }
    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let invalid = |reason: String| ValidationError::InvalidHostname {
        value: hostname.to_string(),
        reason,
    };
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(invalid(format!("longer than {MAX_HOSTNAME_LEN} characters")));
    }
    if let Some(ch) = hostname
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
    {
        return Err(invalid(format!("invalid character {ch:?}")));
    }
    if hostname.starts_with(['-', '.']) || hostname.ends_with(['-', '.']) {
        return Err(invalid("cannot start or end with a hyphen or dot".into()));
    }
    Ok(())
}

/// Rejects port 0.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPort`] for 0.
pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::InvalidPort(0));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("from", "alice@example.com").is_ok());
        assert!(validate_email("from", " <alice@example.com> ").is_ok());
        assert_eq!(
            validate_email("from", ""),
            Err(ValidationError::Empty { field: "from" })
        );
        for bad in ["alice", "@example.com", "alice@", "a@b@c"] {
            assert!(
                matches!(validate_email("to", bad), Err(ValidationError::InvalidEmail { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_emails() {
        assert!(validate_emails("to", &["a@x.org", "b@y.org"]).is_ok());
        let err = validate_emails("to", &["a@x.org", "broken"]).unwrap_err();
        assert_eq!(err.field(), "to");
        assert_eq!(err.to_string(), "to contains invalid email: broken");
        assert!(validate_emails::<&str>("to", &[]).is_err());
    }

    #[test]
    fn test_validate_hostname() {
        assert!(validate_hostname("smtp.office365.com").is_ok());
        assert!(validate_hostname("192.0.2.10").is_ok());
        assert!(validate_hostname("2001:db8::1").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("mail_server").is_err());
        assert!(validate_hostname("-mx.example.com").is_err());
        assert!(validate_hostname("mx.example.com.").is_err());
        assert!(validate_hostname(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(25).is_ok());
        assert_eq!(validate_port(0), Err(ValidationError::InvalidPort(0)));
    }
}
