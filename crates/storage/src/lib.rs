//! Storage layer: the results ledger.
//!
//! The ledger is a flat CSV table (`FilePath`, `ContainsConfidentialInformation`)
//! that only ever grows. Its keys form the resume set of the next run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const KEY_COLUMN: &str = "FilePath";
pub const VERDICT_COLUMN: &str = "ContainsConfidentialInformation";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger encoding failed: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "FilePath")]
    pub key: String,
    #[serde(rename = "ContainsConfidentialInformation")]
    pub verdict: String,
}

impl LedgerEntry {
    pub fn new(key: impl Into<String>, verdict: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            verdict: verdict.into(),
        }
    }
}

/// Append-only CSV ledger.
///
/// Holds no file handle: every `append` is a full open/write/close cycle, so a
/// crash between calls never leaves a half-open writer behind. Callers must
/// keep at most one `append` in flight.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys of every valid row. A missing ledger is an empty set.
    pub async fn load(&self) -> Result<HashSet<String>, LedgerError> {
        let keys: HashSet<String> = self
            .entries()
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        info!(
            path = %self.path.display(),
            count = keys.len(),
            "Loaded processed files"
        );
        Ok(keys)
    }

    /// Every valid row in file order. Rows without a key are skipped.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Ledger does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_rows(&raw))
    }

    pub async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let fresh = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if fresh {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut row = encode_row(entry, fresh)?;
        if !fresh && !self.ends_with_newline().await? {
            row.insert(0, b'\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&row).await?;
        file.flush().await?;
        file.sync_data().await?;

        if fresh {
            debug!(path = %self.path.display(), "Ledger header written");
        }
        debug!(key = %entry.key, verdict = %entry.verdict, "Ledger row written");
        Ok(())
    }

    /// Hand-edited ledgers may lack a trailing newline on the last row.
    async fn ends_with_newline(&self) -> Result<bool, LedgerError> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::End(-1)).await?;
        Ok(file.read_u8().await? == b'\n')
    }
}

/// Header (when `with_header`) plus one row, encoded in a single buffer so the
/// file sees one write per append.
fn encode_row(entry: &LedgerEntry, with_header: bool) -> Result<Vec<u8>, LedgerError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        writer.write_record([KEY_COLUMN, VERDICT_COLUMN])?;
    }
    writer.serialize(entry)?;
    writer
        .into_inner()
        .map_err(|e| LedgerError::Io(e.into_error()))
}

fn parse_rows(raw: &[u8]) -> Vec<LedgerEntry> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw);

    let (key_idx, verdict_idx) = match reader.headers() {
        Ok(headers) => (
            headers.iter().position(|h| h == KEY_COLUMN),
            headers.iter().position(|h| h == VERDICT_COLUMN),
        ),
        Err(e) => {
            warn!(error = %e, "Ledger header is unreadable; no rows loaded");
            return Vec::new();
        }
    };
    let Some(key_idx) = key_idx else {
        warn!("Ledger has no '{KEY_COLUMN}' column; no rows loaded");
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(row = line + 1, error = %e, "Skipping unreadable ledger row");
                continue;
            }
        };
        match record.get(key_idx).filter(|k| !k.is_empty()) {
            Some(key) => entries.push(LedgerEntry {
                key: key.to_string(),
                verdict: verdict_idx
                    .and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string(),
            }),
            None => warn!(
                row = line + 1,
                "A row in the ledger is missing the '{KEY_COLUMN}' field"
            ),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_ledger_loads_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("results.csv"));
        assert!(ledger.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn header_is_written_once() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("nested/results.csv"));
        ledger.append(&LedgerEntry::new("a.txt", "True")).await.unwrap();
        ledger.append(&LedgerEntry::new("b.txt", "error")).await.unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(
            text,
            "FilePath,ContainsConfidentialInformation\na.txt,True\nb.txt,error\n"
        );
        let keys = ledger.load().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("a.txt") && keys.contains("b.txt"));
    }

    #[tokio::test]
    async fn delimiter_in_key_round_trips() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("results.csv"));
        let entry = LedgerEntry::new("reports/q1, \"final\".docx", "False");
        ledger.append(&entry).await.unwrap();

        assert_eq!(ledger.entries().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut raw = b"FilePath,ContainsConfidentialInformation\ngood.txt,True\n,False\n".to_vec();
        raw.extend_from_slice(b"\xff\xfe.txt,True\n");
        raw.extend_from_slice(b"later.txt,False\n");
        std::fs::write(&path, raw).unwrap();

        let entries = Ledger::new(&path).entries().await.unwrap();
        assert_eq!(
            entries,
            vec![
                LedgerEntry::new("good.txt", "True"),
                LedgerEntry::new("later.txt", "False"),
            ]
        );
    }

    #[tokio::test]
    async fn short_rows_keep_their_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(
            &path,
            "FilePath,ContainsConfidentialInformation\nonly-key.txt\nfull.txt,False\n",
        )
        .unwrap();
        let entries = Ledger::new(&path).entries().await.unwrap();
        assert_eq!(
            entries,
            vec![
                LedgerEntry::new("only-key.txt", ""),
                LedgerEntry::new("full.txt", "False"),
            ]
        );
    }

    #[tokio::test]
    async fn appending_to_existing_ledger_skips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "FilePath,ContainsConfidentialInformation\nold.txt,False\n")
            .unwrap();
        let ledger = Ledger::new(&path);
        ledger.append(&LedgerEntry::new("new.txt", "True")).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(KEY_COLUMN).count(), 1);
        assert_eq!(ledger.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn append_after_unterminated_last_row_starts_a_new_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "FilePath,ContainsConfidentialInformation\nold.txt,False").unwrap();
        let ledger = Ledger::new(&path);
        ledger.append(&LedgerEntry::new("new.txt", "True")).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "FilePath,ContainsConfidentialInformation\nold.txt,False\nnew.txt,True\n"
        );
        assert_eq!(
            ledger.entries().await.unwrap(),
            vec![
                LedgerEntry::new("old.txt", "False"),
                LedgerEntry::new("new.txt", "True")
            ]
        );
    }
}
