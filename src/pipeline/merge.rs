use crate::constants::{CASE_NUM, EXCLUDED_FIELDS};
use crate::error::{Result, ScraperError};
use crate::metrics::MergeMetrics;
use crate::store::{self, StoreWriter};
use crate::types::{value_text, Record};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Outcome of collapsing raw stores into one record per case
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergeReport {
    pub input_records: usize,
    pub unique_cases: usize,
    pub output_file: PathBuf,
}

/// Strip a raw record down to its meaningful fields.
///
/// Excluded attributes and null/blank values are dropped; keys and values are
/// trimmed and every value is kept as text.
pub fn clean_record(raw: &Record) -> Record {
    let mut cleaned = Record::new();
    for (key, value) in raw {
        let key = key.trim();
        if key.is_empty() || EXCLUDED_FIELDS.contains(&key) {
            continue;
        }
        let Some(text) = value_text(value) else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        cleaned.insert(key.to_string(), Value::String(text.to_string()));
    }
    cleaned
}

/// Case number of a cleaned record
pub fn case_key(record: &Record) -> Option<&str> {
    record.get(CASE_NUM).and_then(Value::as_str)
}

/// Keyed accumulator for partial records of the same case.
///
/// Cases keep the order they were first seen in; within a case a later value
/// replaces an earlier one field by field.
#[derive(Debug, Default)]
pub struct CaseMerger {
    index: HashMap<String, usize>,
    records: Vec<Record>,
}

impl CaseMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay `record`'s fields onto the accumulated record for `case_num`.
    pub fn merge(&mut self, case_num: &str, record: Record) {
        match self.index.get(case_num) {
            Some(&i) => {
                let existing = &mut self.records[i];
                for (key, value) in record {
                    existing.insert(key, value);
                }
            }
            None => {
                self.index.insert(case_num.to_string(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Clean and merge every record in the store at `path`.
    /// Fails on the first record without a case number.
    pub fn merge_store(&mut self, path: &Path) -> Result<usize> {
        let mut read = 0;
        for item in store::read_records(path)? {
            let (line, raw) = item?;
            let cleaned = clean_record(&raw);
            let case_num = case_key(&cleaned)
                .ok_or_else(|| ScraperError::MissingField {
                    field: CASE_NUM.to_string(),
                    path: path.to_path_buf(),
                    line,
                })?
                .to_string();
            self.merge(&case_num, cleaned);
            read += 1;
        }
        debug!(path = %path.display(), records = read, "merged store");
        Ok(read)
    }

    pub fn get(&self, case_num: &str) -> Option<&Record> {
        self.index.get(case_num).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Merge `inputs` in order and write one record per case to `output`.
/// Later stores override earlier ones.
#[instrument(skip_all, fields(output = %output.display()))]
pub fn dedupe_stores(inputs: &[PathBuf], output: &Path) -> Result<MergeReport> {
    let mut merger = CaseMerger::new();
    let mut input_records = 0;
    for input in inputs {
        input_records += merger.merge_store(input)?;
    }

    let mut writer = StoreWriter::create(output)?;
    for record in merger.records() {
        writer.write(record)?;
    }
    let unique_cases = writer.finish()?;

    MergeMetrics::merged(input_records, unique_cases);
    info!(input_records, unique_cases, "deduplicated records");

    Ok(MergeReport {
        input_records,
        unique_cases,
        output_file: output.to_path_buf(),
    })
}
