use crate::constants::{
    COMBINED_ADDRESS, GEOCODED_ADDRESS, GEOCODED_LATITUDE, GEOCODED_LONGITUDE, GEOCODED_SCORE,
};
use crate::error::Result;
use crate::metrics::GeocodeMetrics;
use crate::pipeline::compose::{combined_address, compose};
use crate::store::{self, StoreWriter};
use crate::types::{GeocodeCandidate, GeocodeRequest, Geocoder, Record};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// What happened to one record in the geocoding stage
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Matched { score: f64 },
    NoMatch,
    BlankAddress,
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GeocodeReport {
    pub records: usize,
    pub matched: usize,
    pub no_match: usize,
    pub blank_address: usize,
    pub failed: usize,
    pub output_file: PathBuf,
}

impl GeocodeReport {
    fn tally(&mut self, outcome: &GeocodeOutcome) {
        self.records += 1;
        match outcome {
            GeocodeOutcome::Matched { .. } => self.matched += 1,
            GeocodeOutcome::NoMatch => self.no_match += 1,
            GeocodeOutcome::BlankAddress => self.blank_address += 1,
            GeocodeOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Copy the best candidate's fields into `record`, keeping everything already there.
pub fn apply_candidate(record: &mut Record, candidate: &GeocodeCandidate) {
    record.insert(
        GEOCODED_ADDRESS.to_string(),
        Value::String(candidate.address.clone()),
    );
    record.insert(GEOCODED_LATITUDE.to_string(), json!(candidate.location.y));
    record.insert(GEOCODED_LONGITUDE.to_string(), json!(candidate.location.x));
    record.insert(GEOCODED_SCORE.to_string(), json!(candidate.score));
}

/// Runs composed records through a [`Geocoder`] one at a time.
///
/// Lookup failures never escape: the record is passed through unchanged and
/// the failure is logged and counted.
pub struct GeocodeAdapter<'a> {
    geocoder: &'a dyn Geocoder,
    request: GeocodeRequest,
}

impl<'a> GeocodeAdapter<'a> {
    pub fn new(geocoder: &'a dyn Geocoder, request: GeocodeRequest) -> Self {
        Self { geocoder, request }
    }

    /// Geocode one composed record.
    pub async fn enrich(&self, mut record: Record) -> (Record, GeocodeOutcome) {
        let address = match record.get(COMBINED_ADDRESS).and_then(Value::as_str) {
            Some(a) => a.trim().to_string(),
            None => combined_address(&record),
        };
        if address.is_empty() {
            GeocodeMetrics::skipped_blank();
            debug!("blank address, not geocoding");
            return (record, GeocodeOutcome::BlankAddress);
        }

        let started = Instant::now();
        let result = self.geocoder.geocode(&address, &self.request).await;
        GeocodeMetrics::lookup_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(candidates) => match candidates.first() {
                Some(best) => {
                    apply_candidate(&mut record, best);
                    GeocodeMetrics::matched(best.score);
                    (record, GeocodeOutcome::Matched { score: best.score })
                }
                None => {
                    GeocodeMetrics::no_match();
                    debug!(%address, "no geocode candidates");
                    (record, GeocodeOutcome::NoMatch)
                }
            },
            Err(e) => {
                GeocodeMetrics::failed();
                warn!(%address, error = %e, "Failed to geocode");
                (record, GeocodeOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Compose and geocode every record in `input`, writing results to `output`.
    #[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
    pub async fn geocode_store(&self, input: &Path, output: &Path) -> Result<GeocodeReport> {
        let reader = store::read_records(input)?;
        let mut writer = StoreWriter::create(output)?;
        let mut report = GeocodeReport {
            output_file: output.to_path_buf(),
            ..Default::default()
        };

        for item in reader {
            let (_, record) = item?;
            let (record, outcome) = self.enrich(compose(record)).await;
            report.tally(&outcome);
            writer.write(&record)?;
            if report.records % 100 == 0 {
                writer.flush()?;
                debug!(records = report.records, "geocoding progress");
            }
        }
        writer.finish()?;

        info!(
            records = report.records,
            matched = report.matched,
            no_match = report.no_match,
            blank_address = report.blank_address,
            failed = report.failed,
            "geocoded records"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScraperError;
    use crate::types::{BoundingBox, Point};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeGeocoder {
        calls: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(
            &self,
            address: &str,
            request: &GeocodeRequest,
        ) -> Result<Vec<GeocodeCandidate>> {
            self.calls.lock().unwrap().push(address.to_string());
            assert_eq!(request.location_type, "rooftop");
            if address.contains("Nowhere") {
                return Ok(Vec::new());
            }
            if address.contains("Timeout") {
                return Err(ScraperError::Api {
                    message: "operation timed out".into(),
                });
            }
            Ok(vec![
                GeocodeCandidate {
                    address: format!("{} (matched)", address),
                    location: Point { x: -87.9237, y: 43.0418 },
                    score: 98.5,
                },
                GeocodeCandidate {
                    address: "second best".into(),
                    location: Point { x: 0.0, y: 0.0 },
                    score: 50.0,
                },
            ])
        }
    }

    fn request() -> GeocodeRequest {
        GeocodeRequest {
            search_extent: BoundingBox::milwaukee_county(),
            location_type: "rooftop".into(),
            max_locations: 1,
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_first_candidate_is_merged() {
        let geocoder = FakeGeocoder::new();
        let adapter = GeocodeAdapter::new(&geocoder, request());
        let input = compose(record(json!({
            "CaseNum": "A",
            "EventAddr": "901 N 9th St",
            "EventCity": "Milwaukee"
        })));

        let (out, outcome) = adapter.enrich(input.clone()).await;

        assert_eq!(outcome, GeocodeOutcome::Matched { score: 98.5 });
        assert_eq!(out["geocoded_address"], json!("901 N 9th St, Milwaukee (matched)"));
        assert_eq!(out["geocoded_latitude"], json!(43.0418));
        assert_eq!(out["geocoded_longitude"], json!(-87.9237));
        assert_eq!(out["geocoded_score"], json!(98.5));
        for (key, value) in &input {
            assert_eq!(&out[key], value);
        }
    }

    #[tokio::test]
    async fn test_no_candidates_leaves_record_unchanged() {
        let geocoder = FakeGeocoder::new();
        let adapter = GeocodeAdapter::new(&geocoder, request());
        let input = compose(record(json!({"CaseNum": "B", "EventAddr": "1 Nowhere Rd"})));

        let (out, outcome) = adapter.enrich(input.clone()).await;

        assert_eq!(outcome, GeocodeOutcome::NoMatch);
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_geocoder_error_passes_record_through() {
        let geocoder = FakeGeocoder::new();
        let adapter = GeocodeAdapter::new(&geocoder, request());
        let input = compose(record(json!({"CaseNum": "C", "EventAddr": "Timeout Ave"})));

        let (out, outcome) = adapter.enrich(input.clone()).await;

        assert!(matches!(outcome, GeocodeOutcome::Failed(ref m) if m.contains("timed out")));
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_blank_address_skips_lookup() {
        let geocoder = FakeGeocoder::new();
        let adapter = GeocodeAdapter::new(&geocoder, request());
        let input = compose(record(json!({"CaseNum": "D", "EventAddr": "  "})));

        let (out, outcome) = adapter.enrich(input.clone()).await;

        assert_eq!(outcome, GeocodeOutcome::BlankAddress);
        assert_eq!(out, input);
        assert!(geocoder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_geocode_store_continues_past_failures() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("deduped.jsonl");
        let output = dir.path().join("geocoded.jsonl");
        fs::write(
            &input,
            "{\"CaseNum\":\"A\",\"EventAddr\":\"Timeout Ave\"}\n\
             {\"CaseNum\":\"B\",\"EventAddr\":\"901 N 9th St\",\
             \"EventCity\":\"Milwaukee\",\"EventState\":\"WI\"}\n\
             {\"CaseNum\":\"C\"}\n",
        )
        .unwrap();
        let geocoder = FakeGeocoder::new();
        let adapter = GeocodeAdapter::new(&geocoder, request());

        let report = adapter.geocode_store(&input, &output).await.unwrap();

        assert_eq!(report.records, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.matched, 1);
        assert_eq!(report.blank_address, 1);
        let records = store::read_all(&output).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].get("geocoded_address").is_none());
        assert_eq!(records[1]["combined_address"], json!("901 N 9th St, Milwaukee, WI"));
        assert_eq!(records[1]["geocoded_score"], json!(98.5));
        assert_eq!(records[2]["combined_address"], json!(""));
        assert_eq!(
            *geocoder.calls.lock().unwrap(),
            vec!["Timeout Ave".to_string(), "901 N 9th St, Milwaukee, WI".to_string()]
        );
    }
}
