//! Credential masking for logs and console output.

/// Placeholder used for masked values.
pub const MASK: &str = "****";

/// Masks a secret or username.
///
/// Values of up to four characters become `****`; longer values keep their
/// first two and last two characters, e.g. `user@example.com` becomes
/// `us****om`.
#[must_use]
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return MASK.to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{MASK}{tail}")
}

/// Masks an optional value, returning `""` when absent or empty.
#[must_use]
pub fn mask_opt(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => mask(v),
        _ => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mask_boundaries() {
        assert_eq!(mask(""), "****");
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("abcd"), "****");
        assert_eq!(mask("abcde"), "ab****de");
        assert_eq!(mask("user@example.com"), "us****om");
    }

    #[test]
    fn test_mask_multibyte() {
        assert_eq!(mask("pässwört"), "pä****rt");
    }

    #[test]
    fn test_mask_opt() {
        assert_eq!(mask_opt(None), "");
        assert_eq!(mask_opt(Some("")), "");
        assert_eq!(mask_opt(Some("secret-token")), "se****en");
    }

    proptest! {
        #[test]
        fn mask_never_reveals_middle(secret in "[a-z]{5,40}") {
            let masked = mask(&secret);
            prop_assert_eq!(masked.len(), 8);
            prop_assert!(masked.starts_with(&secret[..2]));
            prop_assert!(masked.ends_with(&secret[secret.len() - 2..]));
        }
    }
}
