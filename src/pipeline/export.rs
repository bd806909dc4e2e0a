use crate::constants::{
    DATETIME_FORMAT, DATE_FORMAT, DEATH_DATE, DEATH_DATETIME_COLUMN, DEATH_DATE_COLUMN,
};
use crate::error::Result;
use crate::metrics::ExportMetrics;
use crate::store;
use crate::types::{value_text, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Death time rendered in UTC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeathTimestamp {
    /// `YYYY-MM-DD HH:MM:SS`
    pub datetime: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

/// Convert an epoch-millisecond value to UTC date-time and date strings.
///
/// Missing, `"None"` and unparseable values all convert to `None`.
pub fn convert_death_date(raw: Option<&str>) -> Option<DeathTimestamp> {
    let raw = raw?.trim();
    if raw.is_empty() || raw == "None" {
        return None;
    }
    let millis = match raw.parse::<i64>() {
        Ok(ms) => ms,
        Err(_) => {
            let ms = raw.parse::<f64>().ok().filter(|f| f.is_finite())?;
            if ms.abs() > i64::MAX as f64 {
                return None;
            }
            ms.trunc() as i64
        }
    };
    let dt = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(DeathTimestamp {
        datetime: dt.format(DATETIME_FORMAT).to_string(),
        date: dt.format(DATE_FORMAT).to_string(),
    })
}

/// One CSV row: the record's cells plus its typed death timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub values: Vec<Option<String>>,
    pub death: Option<DeathTimestamp>,
}

/// Records narrowed to a fixed column layout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<OutputRow>,
    pub duplicates_removed: usize,
    pub unparsed_dates: usize,
}

impl Table {
    /// Lay out `records` as rows over the union of their fields, dropping exact duplicates.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen_columns: HashSet<&str> = HashSet::new();
        for record in records {
            for key in record.keys() {
                if key == DEATH_DATETIME_COLUMN || key == DEATH_DATE_COLUMN {
                    continue;
                }
                if seen_columns.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let death_index = columns.iter().position(|c| c == DEATH_DATE);
        if death_index.is_none() && !records.is_empty() {
            warn!("no {} column, death date columns will be empty", DEATH_DATE);
        }

        let mut table = Table {
            columns,
            ..Default::default()
        };
        let mut seen_rows: HashSet<Vec<Option<String>>> = HashSet::new();
        for record in records {
            let values: Vec<Option<String>> = table
                .columns
                .iter()
                .map(|c| record.get(c).and_then(value_text))
                .collect();
            if !seen_rows.insert(values.clone()) {
                table.duplicates_removed += 1;
                continue;
            }

            let raw_death = death_index.and_then(|i| values[i].as_deref());
            let death = convert_death_date(raw_death);
            if death.is_none() {
                let present = raw_death.filter(|r| !r.trim().is_empty() && r.trim() != "None");
                if let Some(raw) = present {
                    debug!(value = raw, "unparseable {}", DEATH_DATE);
                    table.unparsed_dates += 1;
                }
            }
            table.rows.push(OutputRow { values, death });
        }
        table
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .chain([DEATH_DATETIME_COLUMN, DEATH_DATE_COLUMN])
            .collect()
    }

    /// Write the header and every row as CSV.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.header())?;
        for row in &self.rows {
            let death_datetime = row.death.as_ref().map(|d| d.datetime.as_str());
            let death_date = row.death.as_ref().map(|d| d.date.as_str());
            let cells = row
                .values
                .iter()
                .map(|v| v.as_deref())
                .chain([death_datetime, death_date])
                .map(|v| v.unwrap_or(""));
            csv_writer.write_record(cells)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportReport {
    pub input_records: usize,
    pub duplicates_removed: usize,
    pub rows: usize,
    pub unparsed_dates: usize,
    pub output_file: PathBuf,
}

/// Load the geocoded store at `input`, clean it up and write the final CSV to `output`.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn export_csv(input: &Path, output: &Path) -> Result<ExportReport> {
    let records = store::read_all(input)?;
    let table = Table::from_records(&records);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(output)?;
    table.write_csv(file)?;

    ExportMetrics::exported(table.rows.len(), table.duplicates_removed, table.unparsed_dates);
    info!(
        input_records = records.len(),
        rows = table.rows.len(),
        duplicates_removed = table.duplicates_removed,
        unparsed_dates = table.unparsed_dates,
        "exported CSV"
    );

    Ok(ExportReport {
        input_records: records.len(),
        duplicates_removed: table.duplicates_removed,
        rows: table.rows.len(),
        unparsed_dates: table.unparsed_dates,
        output_file: output.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn csv_text(table: &Table) -> String {
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_convert_epoch_millis_in_utc() {
        let converted = convert_death_date(Some("1609459200000")).unwrap();
        assert_eq!(converted.datetime, "2021-01-01 00:00:00");
        assert_eq!(converted.date, "2021-01-01");

        let evening = convert_death_date(Some("1625175045123")).unwrap();
        assert_eq!(evening.datetime, "2021-07-01 21:30:45");
        assert_eq!(evening.date, "2021-07-01");
    }

    #[test]
    fn test_convert_missing_values_to_none() {
        assert_eq!(convert_death_date(None), None);
        assert_eq!(convert_death_date(Some("None")), None);
        assert_eq!(convert_death_date(Some("  ")), None);
        assert_eq!(convert_death_date(Some("yesterday")), None);
        assert_eq!(convert_death_date(Some("NaN")), None);
    }

    #[test]
    fn test_convert_accepts_decimal_text() {
        let converted = convert_death_date(Some("1609459200000.0")).unwrap();
        assert_eq!(converted.datetime, "2021-01-01 00:00:00");
    }

    #[test]
    fn test_identical_rows_collapse_and_near_duplicates_survive() {
        let records = vec![
            record(json!({"CaseNum": "A", "Age": "40", "DeathDate": "1609459200000"})),
            record(json!({"CaseNum": "A", "Age": "40", "DeathDate": "1609459200000"})),
            record(json!({"CaseNum": "A", "Age": "41", "DeathDate": "1609459200000"})),
        ];

        let table = Table::from_records(&records);

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.duplicates_removed, 1);
    }

    #[test]
    fn test_csv_has_union_columns_and_death_columns() {
        let records = vec![
            record(json!({"CaseNum": "A", "DeathDate": "1609459200000", "Age": "40"})),
            record(json!({"CaseNum": "B", "DeathDate": "None", "geocoded_latitude": 43.0418})),
            record(json!({"CaseNum": "C", "Note": "shot, \"twice\""})),
        ];

        let table = Table::from_records(&records);

        assert_eq!(
            csv_text(&table),
            "CaseNum,DeathDate,Age,geocoded_latitude,Note,death_datetime,death_date\n\
             A,1609459200000,40,,,2021-01-01 00:00:00,2021-01-01\n\
             B,None,,43.0418,,,\n\
             C,,,,\"shot, \"\"twice\"\"\",,\n"
        );
        assert_eq!(table.unparsed_dates, 0);
    }

    #[test]
    fn test_missing_death_date_column_yields_empty_columns() {
        let table = Table::from_records(&[record(json!({"CaseNum": "A"}))]);
        assert_eq!(csv_text(&table), "CaseNum,death_datetime,death_date\nA,,\n");
    }

    #[test]
    fn test_unparseable_dates_are_counted_not_fatal() {
        let table =
            Table::from_records(&[record(json!({"CaseNum": "A", "DeathDate": "01/02/2021"}))]);
        assert_eq!(table.unparsed_dates, 1);
        assert_eq!(table.rows[0].death, None);
    }

    #[test]
    fn test_export_csv_writes_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("geocoded.jsonl");
        let output = dir.path().join("out").join("records.csv");
        store::write_records(
            &input,
            [
                &record(json!({"CaseNum": "A", "DeathDate": "1609459200000"})),
                &record(json!({"CaseNum": "A", "DeathDate": "1609459200000"})),
            ],
        )
        .unwrap();

        let report = export_csv(&input, &output).unwrap();

        assert_eq!(report.input_records, 2);
        assert_eq!(report.rows, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "CaseNum,DeathDate,death_datetime,death_date\n\
             A,1609459200000,2021-01-01 00:00:00,2021-01-01\n"
        );
    }
}
