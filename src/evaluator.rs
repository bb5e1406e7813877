//! Decides whether a geocoder candidate pins a venue or only an area.

use serde::Serialize;

use crate::geocoder::{BoundingBox, CandidateResult};
use crate::venue::Coordinate;

/// Boxes wider than this are too imprecise to stand for a point.
pub const MAX_DIAGONAL_METERS: f64 = 2_000.0;
/// Below this a box is accepted even without a point-like class.
pub const POINT_DIAGONAL_METERS: f64 = 400.0;

const METERS_PER_DEGREE: f64 = 111_320.0;

/// Address levels that stand for an area rather than a venue.
const AREA_CLASSES: &[&str] = &[
    "city",
    "town",
    "village",
    "suburb",
    "borough",
    "quarter",
    "neighbourhood",
    "city_block",
    "residential",
    "administrative",
];

/// Classes whose `type` names an address level directly.
const AREA_LEVEL_CLASSES: &[&str] = &["place", "boundary", "landuse"];

const POINT_CLASSES: &[&str] = &[
    "building",
    "amenity",
    "shop",
    "leisure",
    "tourism",
    "railway",
    "public_transport",
    "aeroway",
];

const ACCEPTED_WEIGHT: f64 = 100.0;
const IMPORTANCE_WEIGHT: f64 = 10.0;
const PLACE_RANK_WEIGHT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Class or address detail identifies a single place.
    PointMatch,
    /// Generic class, but the box is small enough.
    TightBox,
    TooImprecise,
    AreaMatch,
    LooseBox,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::PointMatch | Verdict::TightBox)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub diagonal_meters: Option<f64>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub coordinate: Coordinate,
    pub evaluation: Evaluation,
    pub index: usize,
}

/// Diagonal of the box in meters, on a flat earth scaled by the cosine of the
/// mean latitude. Good enough at city scale.
pub fn bbox_diagonal_meters(bbox: &BoundingBox) -> f64 {
    let mean_lat = ((bbox.south + bbox.north) / 2.0).to_radians();
    let dy = (bbox.north - bbox.south).abs() * METERS_PER_DEGREE;
    let dx = (bbox.east - bbox.west).abs() * METERS_PER_DEGREE * mean_lat.cos();
    dx.hypot(dy)
}

pub fn evaluate(candidate: &CandidateResult) -> Evaluation {
    let diagonal_meters = candidate.bounding_box.as_ref().map(bbox_diagonal_meters);
    let verdict = classify(candidate, diagonal_meters);
    let score = score(candidate, verdict);
    Evaluation {
        verdict,
        diagonal_meters,
        score,
    }
}

/// Best accepted candidate for one query, if any. Ties keep the service's order.
pub fn select_best(candidates: &[CandidateResult]) -> Option<Selection> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| (index, candidate, evaluate(candidate)))
        .filter(|(_, _, evaluation)| evaluation.verdict.is_accepted())
        .fold(None, |best: Option<Selection>, (index, candidate, evaluation)| {
            let improves = best
                .as_ref()
                .map_or(true, |current| evaluation.score > current.evaluation.score);
            if improves {
                Some(Selection {
                    coordinate: candidate.coordinate,
                    evaluation,
                    index,
                })
            } else {
                best
            }
        })
}

fn classify(candidate: &CandidateResult, diagonal_meters: Option<f64>) -> Verdict {
    if diagonal_meters.is_some_and(|diagonal| diagonal > MAX_DIAGONAL_METERS) {
        return Verdict::TooImprecise;
    }
    if is_area_class(candidate) {
        return Verdict::AreaMatch;
    }
    let pinned_by_address = candidate
        .address
        .as_ref()
        .is_some_and(|address| address.pins_a_point());
    if POINT_CLASSES.contains(&candidate.class.as_str()) || pinned_by_address {
        return Verdict::PointMatch;
    }
    match diagonal_meters {
        Some(diagonal) if diagonal < POINT_DIAGONAL_METERS => Verdict::TightBox,
        _ => Verdict::LooseBox,
    }
}

/// `highway/residential` is a street, so `type` only counts for area-level
/// classes; `addresstype` counts whatever the class.
fn is_area_class(candidate: &CandidateResult) -> bool {
    let by_address_type = candidate
        .address_type
        .as_deref()
        .is_some_and(|level| AREA_CLASSES.contains(&level));
    by_address_type
        || (AREA_LEVEL_CLASSES.contains(&candidate.class.as_str())
            && AREA_CLASSES.contains(&candidate.place_type.as_str()))
}

fn score(candidate: &CandidateResult, verdict: Verdict) -> f64 {
    let accepted = if verdict.is_accepted() {
        ACCEPTED_WEIGHT
    } else {
        0.0
    };
    let importance = candidate.importance.unwrap_or(0.0) * IMPORTANCE_WEIGHT;
    let rank = f64::from(candidate.place_rank.unwrap_or(0)) * PLACE_RANK_WEIGHT;
    accepted + importance + rank
}
