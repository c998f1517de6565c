// log.rs — Append-only JSONL audit log.
//
// The audit log is stored as a JSONL (JSON Lines) file: one record per line.
// Each record is linked to the previous one via `previous_hash`, forming a
// hash chain, so inserting, deleting, or editing a line is detectable.
//
// The log is only ever opened in append mode and each line goes out in a
// single unbuffered write, so a failed append leaves nothing behind to be
// flushed later. Rotation and retention are handled outside this crate.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::AuditError;
use crate::hasher;
use crate::record::AuditRecord;
use crate::sink::AuditSink;

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    file: File,
    path: PathBuf,
    /// Hash of the last line written; becomes `previous_hash` of the next record.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// If the file already exists, the last line is hashed to recover the
    /// chain state so new records link correctly. Missing parent
    /// directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        }

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            file,
            path,
            last_hash,
        })
    }

    /// Append a record to the log, chaining it to the previous line.
    ///
    /// On failure the log is left as it was before the call: any partially
    /// written bytes are truncated away and the chain does not advance.
    pub fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        record.previous_hash = self.last_hash.clone();

        let json = serde_json::to_string(record)?;
        let mut line = String::with_capacity(json.len() + 1);
        line.push_str(&json);
        line.push('\n');

        let start = self.file.metadata()?.len();
        if let Err(error) = self.file.write_all(line.as_bytes()) {
            if let Err(truncate) = self.file.set_len(start) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %truncate,
                    "could not roll back a partial audit line"
                );
            }
            return Err(error.into());
        }

        // Only advance the chain once the line is actually written.
        self.last_hash = Some(hasher::hash_str(&json));
        Ok(())
    }

    /// Read all records from a log file in append order. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let reader = Self::open_reader(path.as_ref())?;
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }

    /// Read records whose timestamp falls in `[since, until)`, ordered by
    /// timestamp. Either bound may be open.
    ///
    /// Concurrent evaluators may enqueue records slightly out of timestamp
    /// order; the sort is stable so equal timestamps keep append order.
    pub fn read_range(
        path: impl AsRef<Path>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records: Vec<AuditRecord> = Self::read_all(path)?
            .into_iter()
            .filter(|r| since.map_or(true, |s| r.timestamp >= s))
            .filter(|r| until.map_or(true, |u| r.timestamp < u))
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Verify the integrity of a log file's hash chain.
    ///
    /// Returns `Ok(true)` if every record's `previous_hash` matches the hash
    /// of the preceding raw line, or an `IntegrityViolation` error otherwise.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, AuditError> {
        let reader = Self::open_reader(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: AuditRecord = serde_json::from_str(&line)?;
            if record.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line, not a re-serialization, since field order may differ.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    /// Return the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(path: &Path) -> Result<BufReader<File>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let reader = Self::open_reader(path)?;
        let mut last_line: Option<String> = None;

        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }

        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

impl AuditSink for AuditLog {
    fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        AuditLog::append(self, record)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
