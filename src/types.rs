use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A death record as an open attribute map. Field order follows first insertion.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Rectangular search extent in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    #[serde(default = "default_wkid")]
    pub wkid: u32,
}

fn default_wkid() -> u32 {
    4326
}

impl BoundingBox {
    /// Milwaukee County
    pub fn milwaukee_county() -> Self {
        Self {
            xmin: -88.09,
            ymin: 42.93,
            xmax: -87.85,
            ymax: 43.12,
            wkid: default_wkid(),
        }
    }

    /// Swap inverted edges so that `xmin <= xmax` and `ymin <= ymax`.
    pub fn normalized(self) -> Self {
        Self {
            xmin: self.xmin.min(self.xmax),
            xmax: self.xmin.max(self.xmax),
            ymin: self.ymin.min(self.ymax),
            ymax: self.ymin.max(self.ymax),
            wkid: self.wkid,
        }
    }

    /// ArcGIS envelope JSON, as accepted by `searchExtent`
    pub fn to_envelope_json(&self) -> String {
        serde_json::json!({
            "xmin": self.xmin,
            "ymin": self.ymin,
            "xmax": self.xmax,
            "ymax": self.ymax,
            "spatialReference": { "wkid": self.wkid },
        })
        .to_string()
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::milwaukee_county()
    }
}

/// Constraints sent with every geocode lookup
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeRequest {
    pub search_extent: BoundingBox,
    pub location_type: String,
    pub max_locations: u32,
}

/// One ranked match returned by a geocoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub address: String,
    pub location: Point,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Paginated source of raw records
#[async_trait::async_trait]
pub trait QuerySource: Send + Sync {
    /// Human-readable name used in logs
    fn source_name(&self) -> &str;

    /// Fetch one page of records starting at `offset`. An empty page ends pagination.
    async fn fetch_page(&self, offset: u64, page_size: u64) -> Result<Vec<Record>>;
}

/// Address to coordinate resolver
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    /// Return candidates ranked best first; an empty list means no match.
    async fn geocode(&self, address: &str, request: &GeocodeRequest)
        -> Result<Vec<GeocodeCandidate>>;
}

/// Text form of an attribute value. Strings are returned as-is, other scalars
/// as their JSON text; `null` has no text.
pub fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
