// Batch pipeline: fetch -> dedupe -> compose/geocode -> export

pub mod compose;
pub mod export;
pub mod fetch;
pub mod geocode;
pub mod merge;

pub use export::{ExportReport, Table};
pub use fetch::{FetchReport, Fetcher};
pub use geocode::{GeocodeAdapter, GeocodeReport};
pub use merge::{CaseMerger, MergeReport};

use crate::config::Config;
use crate::error::Result;
use crate::store;
use crate::types::{Geocoder, QuerySource};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument};

/// Reports from a complete run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub fetch: FetchReport,
    pub merge: MergeReport,
    pub geocode: GeocodeReport,
    pub export: ExportReport,
}

/// Runs the pipeline stages against the stores named in a [`Config`].
///
/// Stages only talk through files: each reads the previous stage's store and
/// replaces its own, so any stage can be rerun on its own.
pub struct Pipeline<'a> {
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Page `source` into the raw store. With `fresh` the store is cleared first.
    #[instrument(skip(self, source), fields(source = %source.source_name()))]
    pub async fn fetch(&self, source: &dyn QuerySource, fresh: bool) -> Result<FetchReport> {
        let started = Instant::now();
        let raw_store = self.config.raw_store();
        if fresh && store::remove(&raw_store)? {
            info!("🧹 Cleared {}", raw_store.display());
        }
        info!("📡 Fetching records into {}", raw_store.display());
        let report = Fetcher::new(source, self.config.page_size, self.config.max_page_failures)
            .fetch_to_store(&raw_store)
            .await?;
        crate::metrics::stage_duration("fetch", started.elapsed().as_secs_f64());
        info!(
            "✅ Fetched {} records in {} pages ({} failed)",
            report.records, report.pages, report.failed_pages
        );
        Ok(report)
    }

    /// Collapse the raw store to one record per case number.
    pub fn dedupe(&self) -> Result<MergeReport> {
        let started = Instant::now();
        let report =
            merge::dedupe_stores(&[self.config.raw_store()], &self.config.deduped_store())?;
        crate::metrics::stage_duration("dedupe", started.elapsed().as_secs_f64());
        info!(
            "✅ Merged {} raw records into {} cases",
            report.input_records, report.unique_cases
        );
        Ok(report)
    }

    /// Compose address/cause fields and geocode every deduplicated record.
    pub async fn geocode(&self, geocoder: &dyn Geocoder) -> Result<GeocodeReport> {
        let started = Instant::now();
        let adapter = GeocodeAdapter::new(geocoder, self.config.geocode_request());
        let report = adapter
            .geocode_store(&self.config.deduped_store(), &self.config.geocoded_store())
            .await?;
        crate::metrics::stage_duration("geocode", started.elapsed().as_secs_f64());
        info!(
            "✅ Geocoded {}/{} records ({} without match, {} blank, {} failed)",
            report.matched, report.records, report.no_match, report.blank_address, report.failed
        );
        Ok(report)
    }

    /// Write the final CSV from the geocoded store.
    pub fn export(&self) -> Result<ExportReport> {
        let started = Instant::now();
        let report = export::export_csv(&self.config.geocoded_store(), &self.config.records_csv())?;
        crate::metrics::stage_duration("export", started.elapsed().as_secs_f64());
        info!("💾 Wrote {} rows to {}", report.rows, report.output_file.display());
        Ok(report)
    }

    /// All four stages in order.
    pub async fn run(
        &self,
        source: &dyn QuerySource,
        geocoder: &dyn Geocoder,
        fresh: bool,
    ) -> Result<PipelineResult> {
        info!("🚀 Starting full pipeline");
        let fetch = self.fetch(source, fresh).await?;
        let merge = self.dedupe()?;
        let geocode = self.geocode(geocoder).await?;
        let export = self.export()?;
        Ok(PipelineResult {
            fetch,
            merge,
            geocode,
            export,
        })
    }
}
