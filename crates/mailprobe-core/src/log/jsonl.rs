//! JSON Lines result log.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{ResultSink, open_append, timestamp};
use crate::error::{Error, Result};

/// Rows buffered between flushes.
const FLUSH_EVERY: usize = 10;

/// Appends one JSON object per row, keyed by column name plus `timestamp`.
#[derive(Debug)]
pub struct JsonlSink {
    writer: BufWriter<File>,
    path: PathBuf,
    columns: Option<Vec<String>>,
    pending: usize,
}

impl JsonlSink {
    /// Opens (or creates) `path` in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            columns: None,
            pending: 0,
        })
    }
}

impl ResultSink for JsonlSink {
    fn write_header(&mut self, columns: &[&str]) -> Result<()> {
        self.columns = Some(columns.iter().map(|c| (*c).to_string()).collect());
        Ok(())
    }

    fn write_row(&mut self, values: &[String]) -> Result<()> {
        let Some(columns) = &self.columns else {
            return Err(Error::Log("write_header must be called before write_row".into()));
        };
        if values.len() != columns.len() {
            return Err(Error::Log(format!(
                "row length ({}) does not match header length ({})",
                values.len(),
                columns.len()
            )));
        }

        let mut object = Map::new();
        object.insert("timestamp".into(), Value::String(timestamp()));
        for (column, value) in columns.iter().zip(values) {
            object.insert(column.clone(), Value::String(value.clone()));
        }

        serde_json::to_writer(&mut self.writer, &object)?;
        self.writer.write_all(b"\n")?;

        self.pending += 1;
        if self.pending >= FLUSH_EVERY {
            self.close()?;
        }
        Ok(())
    }

    fn should_write_header(&self) -> Result<bool> {
        Ok(self.writer.get_ref().metadata()?.len() == 0 && self.writer.buffer().is_empty())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.pending = 0;
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

    #[test]
    fn test_fields_map_to_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let mut sink = JsonlSink::open(&path).unwrap();
        assert!(sink.should_write_header().unwrap());
        sink.write_header(&["Action", "Status", "Error"]).unwrap();
        sink.write_row(&[
            "testauth".to_string(),
            "FAILURE".to_string(),
            "535 \"bad\" credentials".to_string(),
        ])
        .unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["Action"], "testauth");
        assert_eq!(value["Status"], "FAILURE");
        assert_eq!(value["Error"], "535 \"bad\" credentials");
        assert_eq!(value["timestamp"].as_str().unwrap().len(), 19);
    }

    #[test]
    fn test_appends_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        for status in ["SUCCESS", "FAILURE"] {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.write_header(&["Status"]).unwrap();
            sink.write_row(&[status.to_string()]).unwrap();
            sink.close().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_flushes_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.write_header(&["N"]).unwrap();
        for n in 0..FLUSH_EVERY {
            sink.write_row(&[n.to_string()]).unwrap();
        }
        // Not closed: the tenth row triggered the flush.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), FLUSH_EVERY);
    }

    #[test]
    fn test_header_required() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::open(dir.path().join("log.jsonl")).unwrap();
        assert!(matches!(
            sink.write_row(&["x".to_string()]),
            Err(Error::Log(_))
        ));
    }
}
