use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::errors::ParseFailure;
use crate::ingestion::RawRow;
use crate::queries::{QueryBuilder, QueryFragments};
use crate::venue::{VenueComment, VenueRecord};

pub const UNNAMED_VENUE: &str = "(Bar sans nom)";

const NAME_COLUMNS: &[&str] = &["Bar", "Nom", "name"];
const TYPE_COLUMNS: &[&str] = &["Type"];
const ADDRESS_COLUMNS: &[&str] = &["Adresse", "Address"];
const POSTAL_COLUMNS: &[&str] = &["Code Postal", "CP", "code_postal"];
const DISTRICT_COLUMNS: &[&str] = &["Quartier"];
const COUNTRY_COLUMNS: &[&str] = &["Pays", "Country"];
const LATITUDE_COLUMNS: &[&str] = &["Latitude", "Lat"];
const LONGITUDE_COLUMNS: &[&str] = &["Longitude", "Lng", "Lon", "Long"];
const CONSUMER_COLUMNS: &[&str] = &["Consommateur"];
const PRICE_COLUMNS: &[&str] = &["Prix"];
const RATING_COLUMNS: &[&str] = &["Note", "rating"];
const COMMENT_COLUMNS: &[(&str, &[&str])] = &[
    ("AR", &["Commentaire AR", "commentAR"]),
    ("VB", &["Commentaire VB", "commentVB"]),
];

const MAX_RATING: f64 = 5.0;
const MAX_PRICE_TIER: f64 = 4.0;

/// Turns raw sheet rows into venue records with their candidate queries.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    queries: QueryBuilder,
}

impl FieldNormalizer {
    pub fn new(queries: QueryBuilder) -> Self {
        Self { queries }
    }

    pub fn normalize_rows(&self, rows: &[RawRow]) -> Vec<VenueRecord> {
        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                let id = u32::try_from(index + 1).unwrap_or(u32::MAX);
                self.normalize(id, row)
            })
            .collect()
    }

    pub fn normalize(&self, id: u32, row: &RawRow) -> VenueRecord {
        let text = |candidates: &[&str]| {
            pick(row, candidates)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let number = |candidates: &[&str]| pick(row, candidates).and_then(|v| parse_number(v).ok());

        let raw_name = text(NAME_COLUMNS);
        let name = if raw_name.is_empty() {
            UNNAMED_VENUE.to_string()
        } else {
            raw_name
        };
        let address = text(ADDRESS_COLUMNS);
        let postal_code = text(POSTAL_COLUMNS);
        let district = text(DISTRICT_COLUMNS);
        let country = text(COUNTRY_COLUMNS);

        let rating = number(RATING_COLUMNS).filter(|value| (0.0..=MAX_RATING).contains(value));
        let price_tier = number(PRICE_COLUMNS).and_then(price_tier);
        let comments: Vec<VenueComment> = COMMENT_COLUMNS
            .iter()
            .filter_map(|&(author, candidates)| {
                let comment = text(candidates);
                (!comment.is_empty()).then(|| VenueComment {
                    author: author.to_string(),
                    text: comment,
                })
            })
            .collect();
        let visited = rating.is_some_and(|value| value > 0.0) || !comments.is_empty();

        let candidate_queries = self.queries.build(&QueryFragments {
            name: (name != UNNAMED_VENUE).then_some(name.as_str()),
            address: &address,
            postal_code: &postal_code,
            district: &district,
            country: &country,
        });

        VenueRecord {
            id,
            name,
            venue_type: text(TYPE_COLUMNS),
            address,
            postal_code,
            district,
            country,
            consumer: text(CONSUMER_COLUMNS),
            price_tier,
            rating,
            comments,
            latitude: number(LATITUDE_COLUMNS),
            longitude: number(LONGITUDE_COLUMNS),
            visited,
            candidate_queries,
        }
    }
}

/// Finds the first non-blank value among `candidates`, trying the exact header
/// before any header that only matches once case, accents and spacing are
/// folded away.
pub fn pick<'a>(row: &'a RawRow, candidates: &[&str]) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        row.get(candidate)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                let wanted = fold_header(candidate);
                row.fields()
                    .find(|(header, value)| {
                        !value.trim().is_empty() && fold_header(header) == wanted
                    })
                    .map(|(_, value)| value)
            })
    })
}

pub fn fold_header(header: &str) -> String {
    header
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads French or English formatted numbers. A second comma-separated
/// fragment (`"4.3461448,556"`) is an export artifact and is dropped.
pub fn parse_number(raw: &str) -> Result<f64, ParseFailure> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let canonical = if compact.contains('.') {
        compact.split(',').next().unwrap_or_default().to_string()
    } else {
        let mut parts = compact.split(',');
        match (parts.next(), parts.next()) {
            (Some(int), Some(frac)) => format!("{int}.{frac}"),
            (Some(int), None) => int.to_string(),
            _ => String::new(),
        }
    };

    let value = canonical
        .parse::<f64>()
        .ok()
        .or_else(|| leading_number(&canonical))
        .ok_or_else(|| ParseFailure(raw.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseFailure(raw.to_string()))
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (index, c) in text.char_indices() {
        match c {
            '+' | '-' if index == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            '0'..='9' => seen_digit = true,
            _ => break,
        }
        end = index + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    text.get(..end)?.trim_end_matches('.').parse().ok()
}

fn price_tier(value: f64) -> Option<u8> {
    if value <= 0.0 {
        return None;
    }
    Some(value.round().clamp(1.0, MAX_PRICE_TIER) as u8)
}
