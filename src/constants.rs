//! Field names and fixed values shared across the pipeline stages.

// Medical Examiner public data layer, queried with every field and all rows
pub const DEFAULT_QUERY_URL: &str = "https://lio.milwaukeecountywi.gov/arcgis/rest/services/MedicalExaminer/PublicDataAccess/MapServer/1/query?f=json&where=1%3D1&outFields=*&returnGeometry=true&spatialRel=esriSpatialRelIntersects&outSR=102100";

pub const DEFAULT_GEOCODE_URL: &str =
    "https://geocode-api.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates";

pub const PAGE_SIZE: u64 = 1000;
pub const MAX_PAGE_FAILURES: u32 = 3;

pub const ARCGIS_API_KEY_ENV: &str = "ARCGIS_API_KEY";

// Stage file names under the data directory
pub const RAW_STORE_FILE: &str = "mil_scraped.jsonl";
pub const DEDUPED_STORE_FILE: &str = "no_duplicates.jsonl";
pub const GEOCODED_STORE_FILE: &str = "geocoded_records.jsonl";
pub const RECORDS_CSV_FILE: &str = "records.csv";

// Merge key
pub const CASE_NUM: &str = "CaseNum";

/// Attributes dropped from every raw record before merging
pub const EXCLUDED_FIELDS: &[&str] = &["XCoordinate", "YCoordinate", "CaseNum_STR", "ESRI_OID"];

// Composer inputs
pub const EVENT_ADDR: &str = "EventAddr";
pub const EVENT_CITY: &str = "EventCity";
pub const EVENT_STATE: &str = "EventState";
pub const EVENT_ZIP: &str = "EventZip";
pub const CAUSE_A: &str = "CauseA";
pub const CAUSE_B: &str = "CauseB";
pub const CAUSE_OTHER: &str = "CauseOther";

// Composer outputs
pub const COMBINED_ADDRESS: &str = "combined_address";
pub const COMBINED_CAUSES: &str = "combined_causes";

// Geocoder outputs
pub const GEOCODED_ADDRESS: &str = "geocoded_address";
pub const GEOCODED_LATITUDE: &str = "geocoded_latitude";
pub const GEOCODED_LONGITUDE: &str = "geocoded_longitude";
pub const GEOCODED_SCORE: &str = "geocoded_score";

// Post-processor
pub const DEATH_DATE: &str = "DeathDate";
pub const DEATH_DATETIME_COLUMN: &str = "death_datetime";
pub const DEATH_DATE_COLUMN: &str = "death_date";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
