//! DATA payload transparency (RFC 5321 section 4.5.2).

/// Normalises line endings to CRLF and doubles the leading dot of every
/// line that starts with `.`.
///
/// Whether the input ended with a line break is preserved. The terminating
/// `.` line is not added here.
#[must_use]
pub fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 2);
    let mut lines = message.split(|&b| b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let last = lines.peek().is_none();
        let line = if last {
            line
        } else {
            line.strip_suffix(b"\r").unwrap_or(line)
        };

        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        if !last {
            out.extend_from_slice(b"\r\n");
        }
    }

    out
}

/// Removes exactly one leading dot from every line that starts with `.`.
///
/// Inverse of [`dot_stuff`] for CRLF input.
#[must_use]
pub fn dot_unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for (i, line) in data.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        out.extend_from_slice(line.strip_prefix(b".").unwrap_or(line));
    }
    out
}
