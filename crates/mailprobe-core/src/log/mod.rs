//! Per-run result logs.
//!
//! Each run of a tool appends one row to a file named
//! `_<tool>_<action>_<YYYY-MM-DD>.<ext>` in the system temp directory (or a
//! caller-supplied directory). Files are opened in append mode and, on Unix,
//! created with owner-only permissions. Every row starts with a timestamp.

mod csv;
mod jsonl;

pub use self::csv::CsvSink;
pub use self::jsonl::JsonlSink;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDate};

use crate::error::{Error, Result};

/// Timestamp format for the first column of every row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Destination for one structured row per run.
///
/// Callers always pass their column list to [`write_header`](Self::write_header)
/// before the first row. Implementations decide whether that produces output:
/// CSV writes a header line only into an empty file, JSONL only remembers the
/// names.
pub trait ResultSink: Send {
    /// Declares the columns of subsequent rows (without the timestamp).
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    fn write_header(&mut self, columns: &[&str]) -> Result<()>;

    /// Appends one row. `values` must match the declared columns.
    ///
    /// # Errors
    ///
    /// Returns an error if no header was declared, the width differs, or the
    /// write fails.
    fn write_row(&mut self, values: &[String]) -> Result<()>;

    /// Returns true while the underlying file is still empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    fn should_write_header(&self) -> Result<bool>;

    /// Flushes buffered rows to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn close(&mut self) -> Result<()>;

    /// Path of the log file.
    fn path(&self) -> &Path;
}

/// Output format of a result log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Comma-separated values with a header line.
    #[default]
    Csv,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// File extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "jsonl",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" | "jsonl" => Ok(Self::Json),
            other => Err(Error::Config(format!(
                "unsupported log format: {other} (valid options: csv, json)"
            ))),
        }
    }
}

/// Builds the log file path for `tool`/`action` on `date`.
#[must_use]
pub fn log_path(
    dir: &Path,
    tool: &str,
    action: &str,
    format: LogFormat,
    date: NaiveDate,
) -> PathBuf {
    dir.join(format!(
        "_{tool}_{action}_{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    ))
}

/// Opens today's log for `tool`/`action`, creating it if needed.
///
/// Uses the system temp directory when `dir` is `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn open_sink(
    format: LogFormat,
    dir: Option<&Path>,
    tool: &str,
    action: &str,
) -> Result<Box<dyn ResultSink>> {
    let dir = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
    let path = log_path(&dir, tool, action, format, Local::now().date_naive());
    tracing::debug!(path = %path.display(), format = %format, "opening result log");

    Ok(match format {
        LogFormat::Csv => Box::new(CsvSink::open(path)?),
        LogFormat::Json => Box::new(JsonlSink::open(path)?),
    })
}

fn open_append(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("could not open log file {}: {e}", path.display()),
        ))
    })
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
