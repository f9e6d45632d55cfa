//! Microsoft Exchange fingerprinting from the banner and EHLO reply.

use std::fmt;

use mailprobe_smtp::Capabilities;

/// EHLO keywords only Exchange servers advertise.
pub const EXCHANGE_KEYWORDS: &[&str] = &[
    "X-ANONYMOUSTLS",
    "X-EXPS",
    "XEXCH50",
    "X-LINK2STATE",
    "XRDST",
    "XSHADOW",
    "XSHADOWREQUEST",
];

const BANNER_MARKERS: &[&str] = &["microsoft", "exchange", "outlook.com"];
const ONLINE_MARKERS: &[&str] = &["outlook.com", "office365.com", "protection.outlook"];

/// Result of Exchange detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeInfo {
    pub is_exchange: bool,
    /// Human-readable reasons, in detection order.
    pub indicators: Vec<String>,
    /// Host or banner points at Exchange Online.
    pub online: bool,
}

/// Inspects the banner, EHLO capabilities and target host.
#[must_use]
pub fn detect(host: &str, banner: &str, caps: &Capabilities) -> ExchangeInfo {
    let mut indicators = Vec::new();

    let banner_lower = banner.to_ascii_lowercase();
    if let Some(marker) = BANNER_MARKERS.iter().find(|m| banner_lower.contains(*m)) {
        indicators.push(format!("Banner mentions \"{marker}\""));
    }
    for keyword in EXCHANGE_KEYWORDS {
        if caps.supports(keyword) {
            indicators.push(format!("Advertises {keyword}"));
        }
    }

    let host_lower = host.to_ascii_lowercase();
    let online = !indicators.is_empty()
        && ONLINE_MARKERS
            .iter()
            .any(|m| host_lower.contains(m) || banner_lower.contains(m));

    ExchangeInfo {
        is_exchange: !indicators.is_empty(),
        indicators,
        online,
    }
}

impl fmt::Display for ExchangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_exchange {
            return Ok(());
        }
        let rule = "═".repeat(60);
        writeln!(f, "Microsoft Exchange Detected:")?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "  Deployment:          {}",
            if self.online {
                "Exchange Online (Microsoft 365)"
            } else {
                "On-premises or hybrid"
            }
        )?;
        writeln!(f, "  Indicators:")?;
        for indicator in &self.indicators {
            writeln!(f, "    • {indicator}")?;
        }
        writeln!(f, "{rule}")
    }
}
