//! EHLO capability set.

use std::fmt;

/// Extensions advertised in an EHLO reply.
///
/// Keywords are upper-cased and unique; entries keep the order in which the
/// server advertised them. A new set is built for every EHLO exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    entries: Vec<(String, Vec<String>)>,
}

impl Capabilities {
    /// Builds a capability set from the lines of an EHLO reply.
    ///
    /// The first line is the server greeting and is skipped. Each remaining
    /// line contributes one keyword and its whitespace-separated parameters.
    /// The legacy `AUTH=PLAIN LOGIN` form is folded into `AUTH`.
    #[must_use]
    pub fn from_ehlo_lines(lines: &[String]) -> Self {
        let mut caps = Self::default();
        for line in lines.iter().skip(1) {
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };

            let mut params: Vec<String> = Vec::new();
            let keyword = match first.split_once('=') {
                Some((keyword, value)) => {
                    if !value.is_empty() {
                        params.push(value.to_string());
                    }
                    keyword.to_ascii_uppercase()
                }
                None => first.to_ascii_uppercase(),
            };
            params.extend(tokens.map(str::to_string));

            caps.insert(keyword, params);
        }
        caps
    }

    fn insert(&mut self, keyword: String, params: Vec<String>) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == keyword) {
            for param in params {
                if !existing.iter().any(|p| p.eq_ignore_ascii_case(&param)) {
                    existing.push(param);
                }
            }
        } else {
            self.entries.push((keyword, params));
        }
    }

    /// Returns true if no extensions were advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct keywords.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether `keyword` was advertised (case-insensitive).
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.params(keyword).is_some()
    }

    /// Returns the parameters advertised for `keyword`.
    #[must_use]
    pub fn params(&self, keyword: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
            .map(|(_, params)| params.as_slice())
    }

    /// Checks if STARTTLS is advertised.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// Returns the advertised SASL mechanisms in server order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.params("AUTH")
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Returns the maximum message size, if advertised and non-zero.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.params("SIZE")
            .and_then(|p| p.first())
            .and_then(|s| s.parse().ok())
            .filter(|&size| size > 0)
    }

    /// Iterates over `(keyword, params)` in advertisement order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p.as_slice()))
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (keyword, params)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            f.write_str(keyword)?;
            if !params.is_empty() {
                write!(f, "={}", params.join(","))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_keywords_and_params() {
        let caps = Capabilities::from_ehlo_lines(&lines(&[
            "mx.example.com Hello",
            "SIZE 35882577",
            "8BITMIME",
            "STARTTLS",
            "AUTH PLAIN LOGIN XOAUTH2",
        ]));

        assert_eq!(caps.len(), 4);
        assert!(caps.supports_starttls());
        assert!(caps.supports("8bitmime"));
        assert_eq!(caps.auth_mechanisms(), vec!["PLAIN", "LOGIN", "XOAUTH2"]);
        assert_eq!(caps.max_message_size(), Some(35_882_577));
    }

    #[test]
    fn greeting_line_is_not_a_capability() {
        let caps = Capabilities::from_ehlo_lines(&lines(&["STARTTLS"]));
        assert!(caps.is_empty());
        assert!(!caps.supports_starttls());
    }

    #[test]
    fn keywords_are_case_normalized() {
        let caps = Capabilities::from_ehlo_lines(&lines(&["mx", "starttls", "auth login"]));
        let keys: Vec<&str> = caps.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["STARTTLS", "AUTH"]);
        assert_eq!(caps.auth_mechanisms(), vec!["login"]);
    }

    #[test]
    fn legacy_auth_equals_form_is_merged() {
        let caps = Capabilities::from_ehlo_lines(&lines(&[
            "mx",
            "AUTH LOGIN PLAIN",
            "AUTH=LOGIN PLAIN CRAM-MD5",
        ]));
        assert_eq!(caps.len(), 1);
        assert_eq!(caps.auth_mechanisms(), vec!["LOGIN", "PLAIN", "CRAM-MD5"]);
    }

    #[test]
    fn display_is_stable() {
        let caps = Capabilities::from_ehlo_lines(&lines(&[
            "mx",
            "STARTTLS",
            "AUTH PLAIN LOGIN",
            "SIZE 1000",
        ]));
        assert_eq!(caps.to_string(), "STARTTLS;AUTH=PLAIN,LOGIN;SIZE=1000");
    }

    #[test]
    fn zero_size_means_unlimited() {
        let caps = Capabilities::from_ehlo_lines(&lines(&["mx", "SIZE 0"]));
        assert!(caps.supports("SIZE"));
        assert_eq!(caps.max_message_size(), None);
    }

    #[test]
    fn missing_auth_is_empty() {
        let caps = Capabilities::from_ehlo_lines(&lines(&["mx", "PIPELINING"]));
        assert!(caps.auth_mechanisms().is_empty());
        assert_eq!(caps.params("AUTH"), None);
    }
}
