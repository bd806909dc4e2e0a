use crate::error::{Result, ScraperError};
use crate::types::{GeocodeCandidate, GeocodeRequest, Geocoder, QuerySource, Record};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Error object ArcGIS REST services return with an HTTP 200
#[derive(Debug, Deserialize)]
struct ArcGisErrorBody {
    code: Option<i64>,
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

impl ArcGisErrorBody {
    fn into_error(self) -> ScraperError {
        let mut message = format!(
            "ArcGIS error {}: {}",
            self.code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
            self.message.unwrap_or_else(|| "no message".into())
        );
        if !self.details.is_empty() {
            message.push_str(&format!(" ({})", self.details.join("; ")));
        }
        ScraperError::Api { message }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    features: Option<Vec<Feature>>,
    error: Option<ArcGisErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    attributes: Record,
}

/// Parse a MapServer `query` response body into its feature attribute maps.
pub fn parse_query_response(body: &str) -> Result<Vec<Record>> {
    let response: QueryResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(error.into_error());
    }
    let features = response.features.ok_or_else(|| ScraperError::Api {
        message: "query response has no 'features' array".to_string(),
    })?;
    Ok(features.into_iter().map(|f| f.attributes).collect())
}

/// Paging parameters appended to the fixed query URL.
pub fn page_params(offset: u64, page_size: u64) -> [(&'static str, String); 2] {
    [
        ("resultOffset", offset.to_string()),
        ("resultRecordCount", page_size.to_string()),
    ]
}

/// Pages through an ArcGIS MapServer layer `query` endpoint.
///
/// `base_url` carries the fixed filter parameters (`f`, `where`, `outFields`, ...);
/// `resultOffset` and `resultRecordCount` are appended per page.
pub struct ArcGisQueryClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArcGisQueryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl QuerySource for ArcGisQueryClient {
    fn source_name(&self) -> &str {
        "arcgis_medical_examiner"
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, offset: u64, page_size: u64) -> Result<Vec<Record>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&page_params(offset, page_size))
            .send()
            .await?
            .error_for_status()?;
        debug!(status = %response.status(), "query page response");
        let body = response.text().await?;
        parse_query_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    candidates: Option<Vec<GeocodeCandidate>>,
    error: Option<ArcGisErrorBody>,
}

/// Parse a GeocodeServer `findAddressCandidates` response body.
pub fn parse_candidates_response(body: &str) -> Result<Vec<GeocodeCandidate>> {
    let response: CandidatesResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(error.into_error());
    }
    Ok(response.candidates.unwrap_or_default())
}

/// `findAddressCandidates` parameters for one address lookup.
pub fn candidate_params(
    address: &str,
    request: &GeocodeRequest,
    api_key: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("f", "json".to_string()),
        ("singleLine", address.to_string()),
        ("searchExtent", request.search_extent.to_envelope_json()),
        ("locationType", request.location_type.clone()),
        ("maxLocations", request.max_locations.to_string()),
        ("outFields", "Match_addr,Addr_type".to_string()),
        ("token", api_key.to_string()),
    ]
}

fn redact_url(e: reqwest::Error) -> ScraperError {
    ScraperError::Http(e.without_url())
}

/// ArcGIS World Geocoding Service client
pub struct ArcGisGeocoder {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl ArcGisGeocoder {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl Geocoder for ArcGisGeocoder {
    #[instrument(skip(self, request))]
    async fn geocode(
        &self,
        address: &str,
        request: &GeocodeRequest,
    ) -> Result<Vec<GeocodeCandidate>> {
        // The token rides in the query string, so errors must not carry the URL.
        let response = self
            .client
            .get(&self.url)
            .query(&candidate_params(address, request, &self.api_key))
            .send()
            .await
            .map_err(redact_url)?
            .error_for_status()
            .map_err(redact_url)?;
        let body = response.text().await.map_err(redact_url)?;
        parse_candidates_response(&body)
    }
}
