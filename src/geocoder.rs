use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{AppConfig, MAX_RESULT_LIMIT};
use crate::errors::{AppError, AppResult, LookupFailure};
use crate::venue::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressDetails {
    pub house_number: Option<String>,
    pub building: Option<String>,
    pub amenity: Option<String>,
}

impl AddressDetails {
    pub fn pins_a_point(&self) -> bool {
        [&self.house_number, &self.building, &self.amenity]
            .into_iter()
            .any(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// One place proposed by the geocoder for a single query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResult {
    pub coordinate: Coordinate,
    pub bounding_box: Option<BoundingBox>,
    pub class: String,
    pub place_type: String,
    /// Nominatim's `addresstype`: the address level the place stands for.
    pub address_type: Option<String>,
    pub importance: Option<f64>,
    pub place_rank: Option<u32>,
    pub address: Option<AddressDetails>,
}

#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    /// Candidates for one query, most relevant first.
    async fn search(&self, query: &str) -> Result<Vec<CandidateResult>, LookupFailure>;
}

#[derive(Clone)]
pub struct GeocodeService {
    inner: Arc<dyn GeocodeLookup>,
}

impl GeocodeService {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            inner: Arc::new(NominatimClient::new(config)?),
        })
    }

    pub fn from_lookup(lookup: Arc<dyn GeocodeLookup>) -> Self {
        Self { inner: lookup }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<CandidateResult>, LookupFailure> {
        let mut candidates = self.inner.search(query).await?;
        candidates.truncate(usize::from(MAX_RESULT_LIMIT));
        Ok(candidates)
    }
}

/// Client for the Nominatim `/search` endpoint (OSM or a compatible host).
pub struct NominatimClient {
    http: Client,
    search_url: Url,
    country_codes: String,
    language: String,
    limit: u8,
    contact_email: Option<String>,
    api_key: Option<SecretString>,
}

impl NominatimClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(config.geocode_user_agent.as_str())
            .timeout(Duration::from_secs(config.geocode_timeout_secs))
            .build()?;

        let mut search_url = Url::parse(&config.geocode_endpoint).map_err(|err| {
            AppError::Config(format!("invalid geocode endpoint: {err}"))
        })?;
        search_url
            .path_segments_mut()
            .map_err(|_| AppError::Config("geocode endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .push("search");

        Ok(Self {
            http,
            search_url,
            country_codes: config.geocode_country_codes.clone(),
            language: config.geocode_language.clone(),
            limit: config.geocode_result_limit.clamp(1, MAX_RESULT_LIMIT),
            contact_email: config.geocode_contact_email.clone(),
            api_key: config.geocode_api_key.clone(),
        })
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("format", "jsonv2")
                .append_pair("addressdetails", "1")
                .append_pair("limit", &self.limit.to_string())
                .append_pair("countrycodes", &self.country_codes)
                .append_pair("accept-language", &self.language);
            if let Some(email) = &self.contact_email {
                pairs.append_pair("email", email);
            }
            if let Some(key) = &self.api_key {
                pairs.append_pair("key", key.expose_secret());
            }
        }
        url
    }
}

#[async_trait]
impl GeocodeLookup for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<CandidateResult>, LookupFailure> {
        let response = self.http.get(self.request_url(query)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupFailure::Status(status));
        }

        let places: Vec<RawPlace> = response
            .json()
            .await
            .map_err(|err| LookupFailure::Decode(err.to_string()))?;
        trace!(query, returned = places.len(), "geocoder responded");

        let candidates: Vec<CandidateResult> = places
            .into_iter()
            .filter_map(RawPlace::into_candidate)
            .take(usize::from(self.limit))
            .collect();
        debug!(query, candidates = candidates.len(), "geocoder candidates");
        Ok(candidates)
    }
}

#[derive(Deserialize)]
struct RawPlace {
    lat: LenientNumber,
    lon: LenientNumber,
    #[serde(default)]
    boundingbox: Option<Vec<LenientNumber>>,
    #[serde(default, alias = "category")]
    class: Option<String>,
    #[serde(default, rename = "type")]
    place_type: Option<String>,
    #[serde(default)]
    addresstype: Option<String>,
    #[serde(default)]
    importance: Option<LenientNumber>,
    #[serde(default)]
    place_rank: Option<u32>,
    #[serde(default)]
    address: Option<AddressDetails>,
}

/// Nominatim sends most numbers as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
}

impl LenientNumber {
    fn value(&self) -> Option<f64> {
        let value = match self {
            LenientNumber::Number(value) => Some(*value),
            LenientNumber::Text(text) => text.trim().parse::<f64>().ok(),
        };
        value.filter(|value| value.is_finite())
    }
}

impl RawPlace {
    fn into_candidate(self) -> Option<CandidateResult> {
        let coordinate = Coordinate::new(self.lat.value()?, self.lon.value()?)?;
        let bounding_box = self.boundingbox.as_deref().and_then(|values| match values {
            [south, north, west, east] => Some(BoundingBox {
                south: south.value()?,
                north: north.value()?,
                west: west.value()?,
                east: east.value()?,
            }),
            _ => None,
        });

        Some(CandidateResult {
            coordinate,
            bounding_box,
            class: self.class.unwrap_or_default(),
            place_type: self.place_type.unwrap_or_default(),
            address_type: self.addresstype.filter(|value| !value.trim().is_empty()),
            importance: self.importance.as_ref().and_then(LenientNumber::value),
            place_rank: self.place_rank,
            address: self.address,
        })
    }
}
