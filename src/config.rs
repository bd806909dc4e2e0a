use crate::constants;
use crate::error::{Result, ScraperError};
use crate::types::{BoundingBox, GeocodeRequest};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub query_url: String,
    pub page_size: u64,
    pub max_page_failures: u32,
    pub data_dir: PathBuf,
    pub files: FileConfig,
    pub geocode: GeocodeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub raw: String,
    pub deduped: String,
    pub geocoded: String,
    pub csv: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    pub url: String,
    pub location_type: String,
    pub max_locations: u32,
    pub search_extent: BoundingBox,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query_url: constants::DEFAULT_QUERY_URL.to_string(),
            page_size: constants::PAGE_SIZE,
            max_page_failures: constants::MAX_PAGE_FAILURES,
            data_dir: PathBuf::from("data"),
            files: FileConfig::default(),
            geocode: GeocodeConfig::default(),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            raw: constants::RAW_STORE_FILE.to_string(),
            deduped: constants::DEDUPED_STORE_FILE.to_string(),
            geocoded: constants::GEOCODED_STORE_FILE.to_string(),
            csv: constants::RECORDS_CSV_FILE.to_string(),
        }
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_GEOCODE_URL.to_string(),
            location_type: "rooftop".to_string(),
            max_locations: 1,
            search_extent: BoundingBox::milwaukee_county(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the built-in defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Self::default().validated();
        }

        let config_content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&config_content)?;
        info!("Loaded config from {}", path.display());
        config.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.page_size == 0 {
            return Err(ScraperError::Config("page_size must be greater than zero".into()));
        }
        if self.max_page_failures == 0 {
            return Err(ScraperError::Config(
                "max_page_failures must be greater than zero".into(),
            ));
        }
        if self.geocode.max_locations == 0 {
            return Err(ScraperError::Config(
                "geocode.max_locations must be greater than zero".into(),
            ));
        }
        self.geocode.search_extent = self.geocode.search_extent.normalized();
        Ok(self)
    }

    pub fn raw_store(&self) -> PathBuf {
        self.data_dir.join(&self.files.raw)
    }

    pub fn deduped_store(&self) -> PathBuf {
        self.data_dir.join(&self.files.deduped)
    }

    pub fn geocoded_store(&self) -> PathBuf {
        self.data_dir.join(&self.files.geocoded)
    }

    pub fn records_csv(&self) -> PathBuf {
        self.data_dir.join(&self.files.csv)
    }

    pub fn geocode_request(&self) -> GeocodeRequest {
        GeocodeRequest {
            search_extent: self.geocode.search_extent,
            location_type: self.geocode.location_type.clone(),
            max_locations: self.geocode.max_locations,
        }
    }
}

/// Read the geocoding credential from the environment, after loading any `.env` file.
pub fn load_api_key() -> Result<String> {
    dotenv::dotenv().ok();
    let key = std::env::var(constants::ARCGIS_API_KEY_ENV)?;
    if key.trim().is_empty() {
        return Err(ScraperError::Config(format!(
            "{} is set but empty",
            constants::ARCGIS_API_KEY_ENV
        )));
    }
    Ok(key.trim().to_string())
}
