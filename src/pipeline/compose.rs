use crate::constants::{
    CAUSE_A, CAUSE_B, CAUSE_OTHER, COMBINED_ADDRESS, COMBINED_CAUSES, EVENT_ADDR, EVENT_CITY,
    EVENT_STATE, EVENT_ZIP,
};
use crate::types::{value_text, Record};
use serde_json::Value;

fn field(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(value_text)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn join_present<'a>(parts: impl IntoIterator<Item = &'a str>, sep: &str) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// `"street, city, state zip"`, leaving out whatever is missing.
pub fn combined_address(record: &Record) -> String {
    let street = field(record, EVENT_ADDR);
    let city = field(record, EVENT_CITY);
    let state = field(record, EVENT_STATE);
    let zip = field(record, EVENT_ZIP);
    let state_zip = join_present([state.as_str(), zip.as_str()], " ");
    join_present([street.as_str(), city.as_str(), state_zip.as_str()], ", ")
}

/// Up to three causes of death, comma separated.
pub fn combined_causes(record: &Record) -> String {
    let a = field(record, CAUSE_A);
    let b = field(record, CAUSE_B);
    let other = field(record, CAUSE_OTHER);
    join_present([a.as_str(), b.as_str(), other.as_str()], ", ")
}

/// Add `combined_address` and `combined_causes` to a deduplicated record.
pub fn compose(mut record: Record) -> Record {
    let address = combined_address(&record);
    let causes = combined_causes(&record);
    record.insert(COMBINED_ADDRESS.to_string(), Value::String(address));
    record.insert(COMBINED_CAUSES.to_string(), Value::String(causes));
    record
}
