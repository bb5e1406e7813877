use std::path::Path;
use std::time::Duration;
use std::{env, fs, io};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_LIMIT_PER_LOAD: usize = 25;
const DEFAULT_DELAY_MS: u64 = 1_100;
pub const MAX_RESULT_LIMIT: u8 = 3;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub geocode_enabled: bool,
    pub geocode_limit_per_load: usize,
    pub geocode_delay_ms: u64,
    pub geocode_endpoint: String,
    pub geocode_country_codes: String,
    pub geocode_language: String,
    pub geocode_result_limit: u8,
    pub geocode_timeout_secs: u64,
    pub geocode_user_agent: String,
    pub geocode_contact_email: Option<String>,
    pub geocode_api_key: Option<SecretString>,
    pub default_city: String,
    pub default_country: String,
    pub cache_file_name: String,
    pub cache_namespace: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub geocode_enabled: bool,
    pub geocode_limit_per_load: usize,
    pub geocode_delay_ms: u64,
    pub geocode_endpoint: String,
    pub geocode_country_codes: String,
    pub geocode_language: String,
    pub geocode_result_limit: u8,
    pub default_city: String,
    pub default_country: String,
    pub cache_file_name: String,
    pub cache_namespace: String,
    pub has_geocode_api_key: bool,
}

/// Page-level overrides, keyed the way the map page configures itself.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    pub geocode: Option<bool>,
    pub geocode_limit_per_load: Option<usize>,
    pub geocode_delay_ms: Option<u64>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_codes: Option<String>,
    pub language: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            geocode_enabled: parse_bool("GEOCODE_ENABLED", false),
            geocode_limit_per_load: parse_usize("GEOCODE_LIMIT_PER_LOAD", DEFAULT_LIMIT_PER_LOAD),
            geocode_delay_ms: parse_u64("GEOCODE_DELAY_MS", DEFAULT_DELAY_MS),
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            geocode_country_codes: parse_string("GEOCODE_COUNTRY_CODES", "be"),
            geocode_language: parse_string("GEOCODE_LANGUAGE", "fr"),
            geocode_result_limit: clamp_result_limit(parse_u64(
                "GEOCODE_RESULT_LIMIT",
                u64::from(MAX_RESULT_LIMIT),
            )),
            geocode_timeout_secs: parse_u64("GEOCODE_TIMEOUT_SECS", 10).max(1),
            geocode_user_agent: parse_string(
                "GEOCODE_USER_AGENT",
                concat!("barathon-geocoder/", env!("CARGO_PKG_VERSION")),
            ),
            geocode_contact_email: env::var("GEOCODE_CONTACT_EMAIL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            geocode_api_key: env::var("GEOCODE_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            default_city: parse_string("DEFAULT_CITY", "Bruxelles"),
            default_country: parse_string("DEFAULT_COUNTRY", "Belgique"),
            cache_file_name: parse_string("CACHE_FILE_NAME", "barathon-geocache.db"),
            cache_namespace: parse_string("CACHE_NAMESPACE", "barathon.geocode.v1"),
        }
    }

    pub fn load_overrides(path: &Path) -> AppResult<ConfigOverrides> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(AppError::from)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(enabled) = overrides.geocode {
            self.geocode_enabled = enabled;
        }
        if let Some(limit) = overrides.geocode_limit_per_load {
            self.geocode_limit_per_load = limit;
        }
        if let Some(delay) = overrides.geocode_delay_ms {
            self.geocode_delay_ms = delay;
        }
        if let Some(city) = non_blank(&overrides.city) {
            self.default_city = city;
        }
        if let Some(country) = non_blank(&overrides.country) {
            self.default_country = country;
        }
        if let Some(codes) = non_blank(&overrides.country_codes) {
            self.geocode_country_codes = codes;
        }
        if let Some(language) = non_blank(&overrides.language) {
            self.geocode_language = language;
        }
    }

    pub fn geocode_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_delay_ms)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            geocode_enabled: self.geocode_enabled,
            geocode_limit_per_load: self.geocode_limit_per_load,
            geocode_delay_ms: self.geocode_delay_ms,
            geocode_endpoint: self.geocode_endpoint.clone(),
            geocode_country_codes: self.geocode_country_codes.clone(),
            geocode_language: self.geocode_language.clone(),
            geocode_result_limit: self.geocode_result_limit,
            default_city: self.default_city.clone(),
            default_country: self.default_country.clone(),
            cache_file_name: self.cache_file_name.clone(),
            cache_namespace: self.cache_namespace.clone(),
            has_geocode_api_key: self.geocode_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn clamp_result_limit(value: u64) -> u8 {
    u8::try_from(value.clamp(1, u64::from(MAX_RESULT_LIMIT))).unwrap_or(MAX_RESULT_LIMIT)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
