//! Read-only views over venue records for the map page and its list.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::venue::VenueRecord;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueFilter {
    pub show_todo: bool,
    pub show_done: bool,
    /// Applies to visited venues only.
    pub min_rating: f64,
    pub query: String,
}

impl Default for VenueFilter {
    fn default() -> Self {
        Self {
            show_todo: true,
            show_done: true,
            min_rating: 0.0,
            query: String::new(),
        }
    }
}

impl VenueFilter {
    pub fn matches(&self, record: &VenueRecord) -> bool {
        let status_ok = if record.visited() {
            self.show_done && record.rating.unwrap_or(0.0) >= self.min_rating
        } else {
            self.show_todo
        };
        if !status_ok {
            return false;
        }

        let needle = self.query.trim().to_lowercase();
        needle.is_empty() || haystack(record).contains(&needle)
    }

    pub fn apply<'a>(&self, records: &'a [VenueRecord]) -> Vec<&'a VenueRecord> {
        records.iter().filter(|record| self.matches(record)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub visited: usize,
    pub total: usize,
    pub percent: u32,
}

impl ProgressSummary {
    /// Counts only venues that can be placed on the map.
    pub fn from_records(records: &[VenueRecord]) -> Self {
        let placed = display_set(records);
        let total = placed.len();
        let visited = placed.iter().filter(|record| record.visited()).count();
        let percent = if total == 0 {
            0
        } else {
            (visited as f64 * 100.0 / total as f64).round() as u32
        };
        Self {
            visited,
            total,
            percent,
        }
    }
}

pub fn display_set(records: &[VenueRecord]) -> Vec<&VenueRecord> {
    records
        .iter()
        .filter(|record| record.is_coordinate_complete())
        .collect()
}

pub fn tags(record: &VenueRecord) -> Vec<String> {
    let mut tags = Vec::new();
    let mut push = |value: &str| {
        let value = value.trim();
        if !value.is_empty() {
            tags.push(value.to_string());
        }
    };
    push(&record.venue_type);
    push(&record.consumer);
    if let Some(tier) = record.price_tier {
        push(&"€".repeat(usize::from(tier)));
    }
    push(&record.district);
    if !record.postal_code.trim().is_empty() {
        push(&format!("CP {}", record.postal_code.trim()));
    }
    push(&record.country);
    tags
}

/// Search link for the venue; the city disambiguates common bar names.
pub fn maps_link(record: &VenueRecord, city: &str) -> String {
    let query = [
        record.name.as_str(),
        record.address.as_str(),
        record.postal_code.as_str(),
        city,
    ]
    .iter()
    .map(|part| part.trim())
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    match Url::parse(MAPS_SEARCH_URL) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("api", "1")
                .append_pair("query", &query);
            url.to_string()
        }
        Err(_) => MAPS_SEARCH_URL.to_string(),
    }
}

fn haystack(record: &VenueRecord) -> String {
    let mut parts = vec![
        record.name.clone(),
        record.address.clone(),
        record.venue_type.clone(),
        record.district.clone(),
        record.postal_code.clone(),
        record.country.clone(),
    ];
    parts.extend(tags(record));
    parts.extend(record.comments.iter().map(|comment| comment.text.clone()));
    parts.join(" ").to_lowercase()
}
