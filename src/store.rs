//! Line-delimited JSON record stores passed between pipeline stages.
//!
//! Every line holds exactly one JSON object. Readers skip blank lines and
//! report malformed ones with their 1-based line number.

use crate::error::{Result, ScraperError};
use crate::types::Record;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

/// Buffered writer over a store file. Flushed by [`StoreWriter::finish`].
pub struct StoreWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl StoreWriter {
    /// Open `path` for appending, creating it and its parent directory if needed.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), true)
    }

    /// Open `path` truncated.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), false)
    }

    fn open(path: &Path, append: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)?;
        self.written += 1;
        Ok(())
    }

    /// Push buffered lines to disk without closing the store.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush buffered lines and return how many records were written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Replace the store at `path` with `records`.
pub fn write_records<'a, P, I>(path: P, records: I) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Record>,
{
    let mut writer = StoreWriter::create(path)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Streaming reader yielding `(line_number, record)` pairs.
pub struct RecordReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl Iterator for RecordReader {
    type Item = Result<(usize, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<serde_json::Value>(&line)
                .map_err(|e| e.to_string())
                .and_then(|value| match value {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(format!(
                        "expected a JSON object, found {}",
                        json_kind(&other)
                    )),
                });
            return Some(match parsed {
                Ok(record) => Ok((self.line_number, record)),
                Err(message) => Err(ScraperError::MalformedLine {
                    path: self.path.clone(),
                    line: self.line_number,
                    message,
                }),
            });
        }
    }
}

/// Open the store at `path` for streaming reads.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<RecordReader> {
    let path = path.as_ref();
    let file = File::open(path)?;
    Ok(RecordReader {
        path: path.to_path_buf(),
        lines: BufReader::new(file).lines(),
        line_number: 0,
    })
}

/// Read every record in the store at `path`.
pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    read_records(path)?
        .map(|item| item.map(|(_, record)| record))
        .collect()
}

/// Delete the store at `path` if it exists.
pub fn remove<P: AsRef<Path>>(path: P) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
