use std::io;

use reqwest::StatusCode;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("invalid coordinate {lat},{lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("an enrichment run is already draining this record set")]
    Busy,
}

/// A raw field value that could not be read as a finite number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable field value: {0:?}")]
pub struct ParseFailure(pub String);

/// One geocoder query that produced no usable response.
#[derive(Debug, Error)]
pub enum LookupFailure {
    #[error("geocoder transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("geocoder answered with status {0}")]
    Status(StatusCode),
    #[error("geocoder response could not be decoded: {0}")]
    Decode(String),
}
