//! Resumable LSI CSV output.
//!
//! Rows are appended by writing the whole file to a sibling temp file and
//! renaming it over the original, so a crash never leaves a half-written row.
//! A JSON state file next to the CSV records a SHA-256 fingerprint of every
//! book already written. The CSV is renamed into place before the state is
//! saved, so on open any row the state does not list is recovered from the
//! CSV's ISBN and title columns.

use crate::metadata::CodexMetadata;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ISBN_COLUMN: &str = "ISBN or SKU";
const TITLE_COLUMN: &str = "Title";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub isbn: String,
    pub title: String,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointState {
    headers_sha256: String,
    processed: BTreeMap<String, CheckpointEntry>,
}

/// Owner of one output CSV and its resume state.
#[derive(Debug)]
pub struct CheckpointManager {
    csv_path: PathBuf,
    state_path: PathBuf,
    headers: Vec<String>,
    state: CheckpointState,
}

/// Identity hash of a book: normalized ISBN and title. The uuid is left out
/// because books without one get a fresh uuid on every load.
pub fn fingerprint(metadata: &CodexMetadata) -> String {
    identity_digest(&metadata.isbn13, &metadata.title)
}

fn identity_digest(isbn: &str, title: &str) -> String {
    let isbn: String = isbn
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(isbn.as_bytes());
    hasher.update([0x1f]);
    hasher.update(title.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn headers_digest(headers: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(headers.join("\u{1f}").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV record: {}", e.error()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to a temp file next to `path`, then rename it into place.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move {:?} to {:?}", tmp, path))
}

impl CheckpointManager {
    /// Open (or start) the checkpoint at `csv_path` for `headers`. An existing
    /// file must have been written with the same header list.
    pub fn open(csv_path: impl Into<PathBuf>, headers: Vec<String>) -> Result<Self> {
        let csv_path = csv_path.into();
        let mut state_name = csv_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        state_name.push(".state.json");
        let state_path = csv_path.with_file_name(state_name);

        if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let digest = headers_digest(&headers);
        let state = if state_path.exists() {
            let text = std::fs::read_to_string(&state_path)
                .with_context(|| format!("Failed to read checkpoint state {:?}", state_path))?;
            let state: CheckpointState = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse checkpoint state {:?}", state_path))?;
            if state.headers_sha256 != digest {
                anyhow::bail!("Checkpoint {:?} was written with a different header list", csv_path);
            }
            state
        } else {
            CheckpointState {
                headers_sha256: digest,
                processed: BTreeMap::new(),
            }
        };

        let mut manager = Self {
            csv_path,
            state_path,
            headers,
            state,
        };
        if !manager.csv_path.exists() {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(&manager.headers)?;
            replace_file(&manager.csv_path, &finish(writer)?)?;
            manager.save_state()?;
            info!("Started checkpoint {:?}", manager.csv_path);
        } else {
            let recovered = manager.recover_rows()?;
            if recovered > 0 {
                warn!("Recovered {} rows missing from {:?}", recovered, manager.state_path);
                manager.save_state()?;
            }
            info!(
                "Resuming checkpoint {:?} with {} books done",
                manager.csv_path,
                manager.state.processed.len()
            );
        }
        Ok(manager)
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn processed_count(&self) -> usize {
        self.state.processed.len()
    }

    pub fn is_processed(&self, metadata: &CodexMetadata) -> bool {
        self.state.processed.contains_key(&fingerprint(metadata))
    }

    /// Append one mapped row in header order and record the book as done.
    pub fn append_row(&mut self, metadata: &CodexMetadata, values: &IndexMap<String, String>) -> Result<()> {
        let mut bytes = std::fs::read(&self.csv_path).with_context(|| format!("Failed to read {:?}", self.csv_path))?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.headers.iter().map(|h| values.get(h).map(String::as_str).unwrap_or("")))?;
        bytes.extend(finish(writer)?);
        replace_file(&self.csv_path, &bytes)?;

        self.state.processed.insert(
            fingerprint(metadata),
            CheckpointEntry {
                isbn: metadata.isbn13.clone(),
                title: metadata.title.clone(),
                written_at: Utc::now(),
            },
        );
        self.save_state()?;
        debug!("Checkpointed '{}'", metadata.title);
        Ok(())
    }

    /// Mark every CSV row the state does not list as processed. Returns the
    /// number of rows added.
    fn recover_rows(&mut self) -> Result<usize> {
        let mut reader = csv::Reader::from_path(&self.csv_path)
            .with_context(|| format!("Failed to read {:?}", self.csv_path))?;
        let written: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if written != self.headers {
            anyhow::bail!("Checkpoint {:?} was written with a different header list", self.csv_path);
        }
        let column = |name: &str| self.headers.iter().position(|h| h == name);
        let (Some(isbn_at), Some(title_at)) = (column(ISBN_COLUMN), column(TITLE_COLUMN)) else {
            debug!("No ISBN and title columns in {:?}, nothing to recover", self.csv_path);
            return Ok(0);
        };

        let mut recovered = 0;
        for record in reader.records() {
            let record = record.with_context(|| format!("Failed to parse a row of {:?}", self.csv_path))?;
            let isbn = record.get(isbn_at).unwrap_or_default();
            let title = record.get(title_at).unwrap_or_default();
            let key = identity_digest(isbn, title);
            if self.state.processed.contains_key(&key) {
                continue;
            }
            self.state.processed.insert(
                key,
                CheckpointEntry {
                    isbn: isbn.to_string(),
                    title: title.to_string(),
                    written_at: Utc::now(),
                },
            );
            recovered += 1;
        }
        Ok(recovered)
    }

    fn save_state(&self) -> Result<()> {
        let text = serde_json::to_vec_pretty(&self.state)?;
        replace_file(&self.state_path, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        vec!["ISBN or SKU".to_string(), "Title".to_string(), "Annotation / Summary".to_string()]
    }

    fn row(isbn: &str, title: &str) -> IndexMap<String, String> {
        IndexMap::from([
            ("Title".to_string(), title.to_string()),
            ("ISBN or SKU".to_string(), isbn.to_string()),
            ("Annotation / Summary".to_string(), "<p>a, b</p>".to_string()),
        ])
    }

    #[test]
    fn test_header_written_once_and_rows_in_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/batch.csv");
        let mut checkpoint = CheckpointManager::open(&path, headers()).unwrap();
        let book = CodexMetadata::new("Tide Tables", "R. Moss");
        checkpoint.append_row(&book, &row("9780306406157", "Tide Tables")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ISBN or SKU,Title,Annotation / Summary");
        assert_eq!(lines[1], "9780306406157,Tide Tables,\"<p>a, b</p>\"");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_resume_skips_written_books() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        let done = CodexMetadata::new("Done", "A");
        let pending = CodexMetadata::new("Pending", "B");
        {
            let mut checkpoint = CheckpointManager::open(&path, headers()).unwrap();
            checkpoint.append_row(&done, &row("", "Done")).unwrap();
        }
        let resumed = CheckpointManager::open(&path, headers()).unwrap();
        assert_eq!(resumed.processed_count(), 1);
        assert!(resumed.is_processed(&done));
        assert!(!resumed.is_processed(&pending));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_lost_state_is_rebuilt_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        let mut done = CodexMetadata::new("Done", "A");
        done.isbn13 = "978-0-306-40615-7".into();
        {
            let mut checkpoint = CheckpointManager::open(&path, headers()).unwrap();
            checkpoint.append_row(&done, &row("9780306406157", "Done")).unwrap();
            std::fs::remove_file(&checkpoint.state_path).unwrap();
        }

        let mut resumed = CheckpointManager::open(&path, headers()).unwrap();
        assert_eq!(resumed.processed_count(), 1);
        assert!(resumed.is_processed(&done));
        assert!(resumed.state_path.exists());

        let next = CodexMetadata::new("Next", "B");
        assert!(!resumed.is_processed(&next));
        resumed.append_row(&next, &row("", "Next")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_header_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        CheckpointManager::open(&path, headers()).unwrap();
        assert!(CheckpointManager::open(&path, vec!["Title".to_string()]).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_identity() {
        let a = CodexMetadata::new("T", "A");
        let mut b = a.clone();
        b.summary_long = "changed".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        b.uuid = "another".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        b.isbn13 = "978-0-306-40615-7".into();
        assert_ne!(fingerprint(&a), fingerprint(&b));
        let mut c = a.clone();
        c.isbn13 = "9780306406157".into();
        assert_eq!(fingerprint(&b), fingerprint(&c));
    }
}
