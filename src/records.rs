//! JSON Lines artifacts written by the pipeline.

use serde::{Serialize, de::DeserializeOwned};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

/// Errors raised while reading or writing record files.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A record failed to serialize or a line failed to parse.
    #[error("Invalid record in {path} (line {line}): {source}")]
    Json {
        /// File being accessed.
        path: PathBuf,
        /// 1-based line number; `0` while writing.
        line: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RecordError + '_ {
    move |source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), RecordError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    Ok(())
}

fn write_lines<T: Serialize>(path: &Path, records: &[T], append: bool) -> Result<usize, RecordError> {
    ensure_parent(path)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record).map_err(|source| RecordError::Json {
            path: path.to_path_buf(),
            line: 0,
            source,
        })?;
        writer.write_all(line.as_bytes()).map_err(io_error(path))?;
        writer.write_all(b"\n").map_err(io_error(path))?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(records.len())
}

/// Replace `path` with one JSON object per line.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<usize, RecordError> {
    write_lines(path, records, false)
}

/// Append records to `path`, creating it when missing.
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<usize, RecordError> {
    write_lines(path, records, true)
}

/// Read every non-blank line of `path`.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RecordError> {
    let file = std::fs::File::open(path).map_err(io_error(path))?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| RecordError::Json {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Compact UTC stamp used in review artifact names, e.g. `20250101T120000`.
pub fn run_stamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]T[hour][minute][second]"))
        .unwrap_or_else(|_| "00000000T000000".to_string())
}
