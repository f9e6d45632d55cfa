//! CSV result log.

use std::fs::File;
use std::path::{Path, PathBuf};

use super::{ResultSink, open_append, timestamp};
use crate::error::{Error, Result};

/// Appends rows to a CSV file, writing the header only into an empty file.
#[derive(Debug)]
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    columns: Option<usize>,
}

impl CsvSink {
    /// Opens (or creates) `path` in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let writer = csv::WriterBuilder::new().flexible(false).from_writer(file);
        Ok(Self {
            writer,
            path,
            columns: None,
        })
    }
}

impl ResultSink for CsvSink {
    fn write_header(&mut self, columns: &[&str]) -> Result<()> {
        if self.should_write_header()? {
            let mut record = Vec::with_capacity(columns.len() + 1);
            record.push("Timestamp");
            record.extend_from_slice(columns);
            self.writer.write_record(&record)?;
            self.writer.flush()?;
        }
        self.columns = Some(columns.len());
        Ok(())
    }

    fn write_row(&mut self, values: &[String]) -> Result<()> {
        let Some(width) = self.columns else {
            return Err(Error::Log("write_header must be called before write_row".into()));
        };
        if values.len() != width {
            return Err(Error::Log(format!(
                "row length ({}) does not match header length ({width})",
                values.len()
            )));
        }

        let stamp = timestamp();
        let mut record = vec![stamp.as_str()];
        record.extend(values.iter().map(String::as_str));
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }

    fn should_write_header(&self) -> Result<bool> {
        Ok(self.writer.get_ref().metadata()?.len() == 0)
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["Action", "Status", "Server", "Error"];

    fn row(status: &str, error: &str) -> Vec<String> {
        vec![
            "testconnect".to_string(),
            status.to_string(),
            "mx.example.com".to_string(),
            error.to_string(),
        ]
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_header(COLUMNS).unwrap();
        sink.write_row(&row("SUCCESS", "")).unwrap();
        sink.close().unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        assert!(!sink.should_write_header().unwrap());
        sink.write_header(COLUMNS).unwrap();
        sink.write_row(&row("FAILURE", "timed out")).unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,Action,Status,Server,Error");
        assert!(lines[1].ends_with(",testconnect,SUCCESS,mx.example.com,"));
        assert!(lines[2].ends_with(",testconnect,FAILURE,mx.example.com,timed out"));
    }

    #[test]
    fn test_fields_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_header(COLUMNS).unwrap();
        sink.write_row(&row("FAILURE", "550 \"no\", go away\nbye"))
            .unwrap();
        sink.close().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[4], "550 \"no\", go away\nbye");
    }

    #[test]
    fn test_row_width_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path().join("log.csv")).unwrap();

        assert!(matches!(sink.write_row(&row("SUCCESS", "")), Err(Error::Log(_))));
        sink.write_header(COLUMNS).unwrap();
        assert!(matches!(
            sink.write_row(&["only one".to_string()]),
            Err(Error::Log(_))
        ));
    }
}
