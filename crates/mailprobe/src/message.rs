//! Test message construction.

use chrono::{DateTime, Utc};

/// Message-ID (without angle brackets) for a message sent through `host`.
#[must_use]
pub fn message_id(host: &str, now: DateTime<Utc>) -> String {
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000);
    let host = if host.is_empty() { "mailprobe.local" } else { host };
    format!("{nanos}.mailprobe@{host}")
}

/// Parts of a plain-text test message.
#[derive(Debug, Clone)]
pub struct TestMessage<'a> {
    pub id: &'a str,
    pub date: DateTime<Utc>,
    pub from: &'a str,
    pub to: &'a [&'a str],
    pub subject: &'a str,
    pub body: &'a str,
}

impl TestMessage<'_> {
    /// Renders the message with CRLF line endings.
    ///
    /// Header values have CR and LF removed so caller input cannot inject
    /// extra headers.
    #[must_use]
    pub fn render(&self) -> String {
        let to: Vec<String> = self.to.iter().map(|addr| header_value(addr)).collect();
        let mut out = String::with_capacity(256 + self.body.len());
        push_header(
            &mut out,
            "Message-ID",
            &format!("<{}>", header_value(self.id)),
        );
        push_header(&mut out, "Date", &self.date.to_rfc2822());
        push_header(&mut out, "From", &header_value(self.from));
        push_header(&mut out, "To", &to.join(", "));
        push_header(&mut out, "Subject", &header_value(self.subject));
        push_header(&mut out, "MIME-Version", "1.0");
        push_header(&mut out, "Content-Type", "text/plain; charset=UTF-8");
        out.push_str("\r\n");
        out.push_str(self.body);
        out.push_str("\r\n");
        out
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

fn header_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
