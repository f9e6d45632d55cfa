//! SASL mechanism selection and credentials.

pub mod sasl;

use std::fmt;

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// `XOAUTH2` - `OAuth2` (Google/Microsoft)
    XOAuth2,
    /// `OAUTHBEARER` - RFC 7628 `OAuth2`
    OAuthBearer,
}

impl AuthMechanism {
    /// Order tried by `"auto"` selection.
    const AUTO_ORDER: [Self; 3] = [Self::XOAuth2, Self::Plain, Self::Login];

    /// Parses a mechanism name. Unimplemented mechanisms yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            "OAUTHBEARER" => Some(Self::OAuthBearer),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }

    /// True for the token-based mechanisms.
    #[must_use]
    pub const fn uses_token(self) -> bool {
        matches!(self, Self::XOAuth2 | Self::OAuthBearer)
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chooses a mechanism from the caller's requested methods and the server's
/// advertised list.
///
/// Requested methods are tried in order and the first hit wins. `"auto"`
/// expands to XOAUTH2 (only when `has_token`), then PLAIN, then LOGIN. An
/// explicit name is returned only if the server advertises it and it is
/// implemented here. Returns `None` when nothing is compatible.
#[must_use]
pub fn select_mechanism<S: AsRef<str>>(
    requested: &[S],
    server: &[String],
    has_token: bool,
) -> Option<AuthMechanism> {
    let advertised = |mech: AuthMechanism| {
        server
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mech.as_str()))
    };

    for method in requested {
        let method = method.as_ref().trim();
        if method.eq_ignore_ascii_case("auto") {
            let hit = AuthMechanism::AUTO_ORDER
                .into_iter()
                .filter(|mech| has_token || !mech.uses_token())
                .find(|mech| advertised(*mech));
            if hit.is_some() {
                return hit;
            }
        } else if let Some(mech) = AuthMechanism::parse(method).filter(|m| advertised(*m)) {
            return Some(mech);
        }
    }
    None
}

/// Credentials for AUTH.
///
/// `Debug` never prints the password or token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Authentication identity.
    pub username: String,
    /// Password for PLAIN and LOGIN.
    pub password: Option<String>,
    /// `OAuth2` access token for XOAUTH2 and OAUTHBEARER.
    pub access_token: Option<String>,
}

impl Credentials {
    /// Creates password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            access_token: None,
        }
    }

    /// Creates token credentials.
    #[must_use]
    pub fn token(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            access_token: Some(token.into()),
        }
    }

    /// Adds an access token to existing credentials.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// True if a non-empty access token is present.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns every secret value held, for redaction checks.
    pub(crate) fn secrets(&self) -> impl Iterator<Item = &str> {
        self.password
            .iter()
            .chain(self.access_token.iter())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("access_token", &self.access_token.as_ref().map(|_| "****"))
            .finish()
    }
}
