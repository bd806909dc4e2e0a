use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mke_scraper::apis::{ArcGisGeocoder, ArcGisQueryClient};
use mke_scraper::config::{load_api_key, Config, DEFAULT_CONFIG_PATH};
use mke_scraper::pipeline::Pipeline;
use mke_scraper::{logging, metrics};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mke_scraper")]
#[command(about = "Milwaukee County Medical Examiner death record scraper")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory holding the stage files (overrides the config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page the public query endpoint into the raw store
    Fetch {
        /// Delete the raw store before fetching instead of appending
        #[arg(long)]
        fresh: bool,
    },
    /// Merge raw records into one record per case number
    Dedupe,
    /// Compose address fields and geocode every deduplicated record
    Geocode,
    /// Write the final CSV from the geocoded store
    Export,
    /// Run fetch, dedupe, geocode and export in order
    Run {
        /// Delete the raw store before fetching instead of appending
        #[arg(long)]
        fresh: bool,
    },
}

fn geocoder(config: &Config) -> Result<ArcGisGeocoder> {
    let api_key = load_api_key().context("loading ArcGIS API key")?;
    Ok(ArcGisGeocoder::new(config.geocode.url.clone(), api_key))
}

async fn execute(command: Commands, config: &Config) -> Result<()> {
    let pipeline = Pipeline::new(config);

    match command {
        Commands::Fetch { fresh } => {
            println!("📡 Fetching records...");
            let source = ArcGisQueryClient::new(config.query_url.clone());
            let report = pipeline.fetch(&source, fresh).await.context("fetch stage")?;
            println!(
                "✅ Fetched {} records ({} pages, {} failed) into {}",
                report.records,
                report.pages,
                report.failed_pages,
                report.output_file.display()
            );
        }
        Commands::Dedupe => {
            println!("🔨 Deduplicating records...");
            let report = pipeline.dedupe().context("dedupe stage")?;
            println!(
                "✅ {} raw records -> {} cases in {}",
                report.input_records,
                report.unique_cases,
                report.output_file.display()
            );
        }
        Commands::Geocode => {
            println!("🗺️  Geocoding records...");
            let geocoder = geocoder(config)?;
            let report = pipeline.geocode(&geocoder).await.context("geocode stage")?;
            println!(
                "✅ Geocoded {}/{} records ({} failed) into {}",
                report.matched,
                report.records,
                report.failed,
                report.output_file.display()
            );
        }
        Commands::Export => {
            println!("💾 Exporting CSV...");
            let report = pipeline.export().context("export stage")?;
            println!(
                "✅ Wrote {} rows ({} duplicates removed) to {}",
                report.rows,
                report.duplicates_removed,
                report.output_file.display()
            );
        }
        Commands::Run { fresh } => {
            println!("🚀 Running full pipeline...");
            let geocoder = geocoder(config)?;
            let source = ArcGisQueryClient::new(config.query_url.clone());
            let result = pipeline.run(&source, &geocoder, fresh).await.context("pipeline run")?;
            println!("\n📊 Pipeline Results:");
            println!("   Fetched: {}", result.fetch.records);
            println!("   Unique cases: {}", result.merge.unique_cases);
            println!("   Geocoded: {}", result.geocode.matched);
            println!("   Geocode failures: {}", result.geocode.failed);
            println!("   Rows exported: {}", result.export.rows);
            println!("   Output file: {}", result.export.output_file.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();

    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    info!(data_dir = %config.data_dir.display(), "configuration loaded");

    if let Err(e) = execute(cli.command, &config).await {
        error!("Run failed: {:#}", e);
        println!("❌ {:#}", e);
        return Err(e);
    }
    Ok(())
}
