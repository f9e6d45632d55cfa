//! SMTP reply parser.
//!
//! Replies are one or more lines of the form `<code><sep><text>` where the
//! separator is `-` on continuation lines and a space on the final line:
//!
//! ```text
//! 250-mx.example.com greets probe.local
//! 250-STARTTLS
//! 250 AUTH PLAIN LOGIN
//! ```
//!
//! The parser has no notion of time. Callers that read from a network peer
//! must bound each read with their own deadline.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// A single reply line split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    /// Three-digit reply code.
    pub code: u16,
    /// True if this line ends the reply.
    pub is_last: bool,
    /// Text after the separator.
    pub text: &'a str,
}

/// Splits one reply line (without CRLF) into code, separator and text.
///
/// # Errors
///
/// Returns a protocol error unless the line starts with exactly three ASCII
/// digits followed by `-`, a space, or nothing.
pub fn parse_line(line: &str) -> Result<ReplyLine<'_>> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::malformed(format!(
            "malformed response line: {:?}",
            truncate(line)
        )));
    }

    let code = bytes[..3]
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

    match bytes.get(3) {
        None => Ok(ReplyLine {
            code,
            is_last: true,
            text: "",
        }),
        Some(b' ') => Ok(ReplyLine {
            code,
            is_last: true,
            text: &line[4..],
        }),
        Some(b'-') => Ok(ReplyLine {
            code,
            is_last: false,
            text: &line[4..],
        }),
        Some(_) => Err(Error::malformed(format!(
            "malformed response line: {:?}",
            truncate(line)
        ))),
    }
}

/// Parses an SMTP reply from its raw lines (CRLF already removed).
///
/// # Errors
///
/// Returns a protocol error if the reply is empty, any line is malformed,
/// the code changes between lines, or a line other than the last one is
/// marked final.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::malformed("empty reply"));
    };
    let code = parse_line(first)?.code;

    let mut text = Vec::with_capacity(lines.len());
    for (i, raw) in lines.iter().enumerate() {
        let line = parse_line(raw)?;
        if line.code != code {
            return Err(Error::malformed(format!(
                "mismatched reply code: expected {code}, got {}",
                line.code
            )));
        }
        let should_be_last = i + 1 == lines.len();
        if line.is_last != should_be_last {
            return Err(Error::malformed(format!(
                "unexpected continuation marker in line {}: {:?}",
                i + 1,
                truncate(raw)
            )));
        }
        text.push(line.text.to_string());
    }

    Ok(Reply::new(ReplyCode::new(code), text))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}

/// Reads one complete reply from a buffered stream.
///
/// Lines are consumed until the terminating line; every line is validated
/// as it arrives so a malformed peer fails fast instead of being read to
/// the end.
///
/// # Errors
///
/// Returns a connection error if the read fails or the stream ends before
/// the final line, and a protocol error for malformed lines.
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut buf = Vec::with_capacity(128);

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(Error::Connection(if lines.is_empty() {
                "connection closed by server".to_string()
            } else {
                "connection closed before reply was complete".to_string()
            }));
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']).to_string();

        let is_last = parse_line(&line)?.is_last;
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

fn truncate(line: &str) -> &str {
    const MAX: usize = 80;
    if line.len() <= MAX {
        return line;
    }
    let mut end = MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
