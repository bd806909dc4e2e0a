use crate::error::{Result, ScraperError};
use crate::metrics::FetchMetrics;
use crate::store::StoreWriter;
use crate::types::QuerySource;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Outcome of paging a source into the raw store
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FetchReport {
    pub pages: usize,
    pub records: usize,
    pub failed_pages: usize,
    pub output_file: PathBuf,
}

/// Pages through a [`QuerySource`], appending every record to a line-delimited store.
pub struct Fetcher<'a> {
    source: &'a dyn QuerySource,
    page_size: u64,
    max_page_failures: u32,
}

impl<'a> Fetcher<'a> {
    pub fn new(source: &'a dyn QuerySource, page_size: u64, max_page_failures: u32) -> Self {
        Self {
            source,
            page_size,
            max_page_failures,
        }
    }

    /// Request pages at offsets `0, page_size, 2 * page_size, ...` until one comes back empty.
    ///
    /// Records are appended, never overwritten. A failed page is logged and skipped;
    /// `max_page_failures` failures in a row abort the fetch.
    #[instrument(skip(self, store_path), fields(source = %self.source.source_name()))]
    pub async fn fetch_to_store(&self, store_path: &Path) -> Result<FetchReport> {
        let mut writer = StoreWriter::append(store_path)?;
        let mut offset: u64 = 0;
        let mut pages = 0;
        let mut failed_pages = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            let started = Instant::now();
            match self.source.fetch_page(offset, self.page_size).await {
                Ok(records) => {
                    consecutive_failures = 0;
                    if records.is_empty() {
                        info!(offset, "empty page, pagination complete");
                        break;
                    }
                    for record in &records {
                        writer.write(record)?;
                    }
                    writer.flush()?;
                    pages += 1;
                    FetchMetrics::page_fetched(records.len(), started.elapsed().as_secs_f64());
                    info!(offset, records = records.len(), "fetched page");
                }
                Err(e) => {
                    failed_pages += 1;
                    consecutive_failures += 1;
                    FetchMetrics::page_failed();
                    warn!(offset, error = %e, "page request failed, skipping");
                    if consecutive_failures >= self.max_page_failures {
                        writer.finish()?;
                        return Err(ScraperError::Api {
                            message: format!(
                                "giving up after {} consecutive failed pages at offset {}: {}",
                                consecutive_failures, offset, e
                            ),
                        });
                    }
                }
            }
            offset += self.page_size;
        }

        let records = writer.finish()?;
        Ok(FetchReport {
            pages,
            records,
            failed_pages,
            output_file: store_path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use crate::types::Record;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves `total` numbered records; offsets listed in `failing` error once each.
    struct FakeSource {
        total: u64,
        failing: Mutex<HashSet<u64>>,
        always_fail: bool,
        offsets: Mutex<Vec<u64>>,
    }

    impl FakeSource {
        fn new(total: u64) -> Self {
            Self {
                total,
                failing: Mutex::new(HashSet::new()),
                always_fail: false,
                offsets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuerySource for FakeSource {
        fn source_name(&self) -> &str {
            "fake"
        }

        async fn fetch_page(&self, offset: u64, page_size: u64) -> Result<Vec<Record>> {
            self.offsets.lock().unwrap().push(offset);
            if self.always_fail || self.failing.lock().unwrap().remove(&offset) {
                return Err(ScraperError::Api {
                    message: "503 Service Unavailable".into(),
                });
            }
            let end = (offset + page_size).min(self.total);
            Ok((offset.min(end)..end)
                .map(|i| json!({"CaseNum": format!("C{i}")}).as_object().cloned().unwrap())
                .collect())
        }
    }

    #[tokio::test]
    async fn test_full_pages_plus_partial_are_all_retrieved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        let source = FakeSource::new(3 * 1000 + 417);

        let report = Fetcher::new(&source, 1000, 3).fetch_to_store(&path).await.unwrap();

        assert_eq!(report.records, 3417);
        assert_eq!(report.pages, 4);
        assert_eq!(report.failed_pages, 0);
        assert_eq!(store::read_all(&path).unwrap().len(), 3417);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 1000, 2000, 3000, 4000]);
    }

    #[tokio::test]
    async fn test_empty_source_stops_after_first_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        let source = FakeSource::new(0);

        let report = Fetcher::new(&source, 1000, 3).fetch_to_store(&path).await.unwrap();

        assert_eq!(report.records, 0);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0]);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_repeated_fetch_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        let source = FakeSource::new(5);
        let fetcher = Fetcher::new(&source, 2, 3);

        fetcher.fetch_to_store(&path).await.unwrap();
        fetcher.fetch_to_store(&path).await.unwrap();

        assert_eq!(store::read_all(&path).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        let source = FakeSource::new(2500);
        source.failing.lock().unwrap().insert(1000);

        let report = Fetcher::new(&source, 1000, 3).fetch_to_store(&path).await.unwrap();

        assert_eq!(report.failed_pages, 1);
        assert_eq!(report.records, 1500);
        let records = store::read_all(&path).unwrap();
        assert_eq!(records[999]["CaseNum"], json!("C999"));
        assert_eq!(records[1000]["CaseNum"], json!("C2000"));
    }

    #[tokio::test]
    async fn test_consecutive_failures_abort() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        let mut source = FakeSource::new(10);
        source.always_fail = true;

        let err = Fetcher::new(&source, 1000, 3).fetch_to_store(&path).await.unwrap_err();

        assert!(matches!(err, ScraperError::Api { .. }));
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 1000, 2000]);
    }
}
