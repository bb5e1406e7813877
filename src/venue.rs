use serde::{Deserialize, Serialize};

use crate::queries::signature;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Returns `None` unless both components are finite and inside WGS84 bounds.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let coordinate = Self { lat, lon };
        coordinate.is_valid().then_some(coordinate)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueComment {
    pub author: String,
    pub text: String,
}

/// A venue row after normalization. Only the coordinate fields change after
/// construction, and only through the enrichment scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct VenueRecord {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub venue_type: String,
    pub address: String,
    pub postal_code: String,
    pub district: String,
    pub country: String,
    pub consumer: String,
    pub price_tier: Option<u8>,
    pub rating: Option<f64>,
    pub comments: Vec<VenueComment>,
    #[serde(rename = "lat")]
    pub(crate) latitude: Option<f64>,
    #[serde(rename = "lng")]
    pub(crate) longitude: Option<f64>,
    pub(crate) visited: bool,
    #[serde(skip)]
    pub(crate) candidate_queries: Vec<String>,
}

impl VenueRecord {
    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
            _ => None,
        }
    }

    pub fn is_coordinate_complete(&self) -> bool {
        matches!(
            (self.latitude, self.longitude),
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite()
        )
    }

    pub fn visited(&self) -> bool {
        self.visited
    }

    pub fn candidate_queries(&self) -> &[String] {
        &self.candidate_queries
    }

    pub fn signature(&self) -> String {
        signature(&self.candidate_queries)
    }

    pub(crate) fn set_coordinate(&mut self, coordinate: Coordinate) {
        self.latitude = Some(coordinate.lat);
        self.longitude = Some(coordinate.lon);
    }
}
