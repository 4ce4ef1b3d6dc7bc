//! Append-only CSV attendance ledger.
//!
//! One row per confirmed attendance: `full name, present, YYYY-MM-DD HH:MM:SS`.
//! No header row; existing rows are never rewritten.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STATUS_PRESENT: &str = "present";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("cannot open ledger {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger write failed: {0}")]
    Write(#[from] csv::Error),
    #[error("ledger flush failed: {0}")]
    Flush(#[from] std::io::Error),
}

/// A single ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub status: String,
    pub timestamp: String,
}

pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Use the CSV file at `path`, creating parent directories as needed.
    ///
    /// The file itself is created on first append.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Open {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a "present" row for `full_name` stamped with `at`, and flush it to disk.
    pub fn append(&self, full_name: &str, at: DateTime<Local>) -> Result<LedgerEntry, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Open {
                path: self.path.display().to_string(),
                source,
            })?;

        let entry = LedgerEntry {
            name: full_name.to_string(),
            status: STATUS_PRESENT.to_string(),
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record([&entry.name, &entry.status, &entry.timestamp])?;
        writer.flush()?;

        tracing::info!(path = %self.path.display(), name = full_name, at = %entry.timestamp, "attendance recorded");
        Ok(entry)
    }

    /// Read every row back, oldest first. A missing file is an empty ledger.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            entries.push(LedgerEntry {
                name: record.get(0).unwrap_or_default().to_string(),
                status: record.get(1).unwrap_or_default().to_string(),
                timestamp: record.get(2).unwrap_or_default().to_string(),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, h, m, s).unwrap()
    }

    #[test]
    fn test_append_writes_row() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("attendance.csv")).unwrap();
        let entry = ledger.append("Alice Smith", at(9, 5, 7)).unwrap();
        assert_eq!(entry.timestamp, "2024-03-05 09:05:07");

        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw, "Alice Smith,present,2024-03-05 09:05:07\n");
    }

    #[test]
    fn test_append_preserves_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Bob Jones,present,2024-03-04 10:00:00\n").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        ledger.append("Alice Smith", at(9, 0, 0)).unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Bob Jones");
        assert_eq!(entries[1].name, "Alice Smith");
        assert_eq!(entries[1].status, "present");
    }

    #[test]
    fn test_names_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("a.csv")).unwrap();
        ledger.append("Smith, Jr. Alice", at(8, 0, 0)).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries[0].name, "Smith, Jr. Alice");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/attendance.csv");
        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.entries().unwrap().is_empty());
        ledger.append("Alice Smith", at(8, 0, 0)).unwrap();
        assert!(path.exists());
    }
}
