pub mod cache;
pub mod catalogue;
pub mod config;
pub mod db;
pub mod errors;
pub mod evaluator;
pub mod geocoder;
pub mod ingestion;
pub mod normalizer;
pub mod queries;
pub mod scheduler;
pub mod venue;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{CacheSnapshot, SqliteCoordinateCache};
use crate::catalogue::ProgressSummary;
use crate::config::{AppConfig, PublicAppConfig};
use crate::db::{bootstrap, DatabaseBootstrap, DatabaseContext};
use crate::errors::AppResult;
use crate::geocoder::GeocodeService;
use crate::normalizer::FieldNormalizer;
use crate::queries::QueryBuilder;
use crate::scheduler::{EnrichmentLimits, EnrichmentStats, GeocodeEnricher, ResolutionSink};
use crate::venue::VenueRecord;

pub use crate::errors::AppError;

/// Everything one map load needs: config, the durable cache, and the enricher
/// that fills missing coordinates.
pub struct Session {
    config: AppConfig,
    cache: Arc<SqliteCoordinateCache>,
    enricher: GeocodeEnricher,
    normalizer: FieldNormalizer,
    cache_path: PathBuf,
    cache_recovered: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealth {
    pub cache_path: String,
    pub cache_entries: usize,
    pub cache_recovered: bool,
    pub config: PublicAppConfig,
}

impl Session {
    pub fn initialize(data_dir: &Path, config: AppConfig) -> AppResult<Self> {
        init_tracing();
        let DatabaseBootstrap {
            context: DatabaseContext { connection, path },
            recovered,
        } = bootstrap(data_dir, &config.cache_file_name)?;
        let cache = Arc::new(SqliteCoordinateCache::new(
            Arc::new(Mutex::new(connection)),
            config.cache_namespace.clone(),
        ));
        let lookup = GeocodeService::new(&config)?;
        let enricher = GeocodeEnricher::new(
            cache.clone(),
            lookup,
            EnrichmentLimits::from_config(&config),
        );
        let normalizer = FieldNormalizer::new(QueryBuilder::from_config(&config));

        Ok(Self {
            config,
            cache,
            enricher,
            normalizer,
            cache_path: path,
            cache_recovered: recovered,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &SqliteCoordinateCache {
        &self.cache
    }

    pub fn health(&self) -> AppResult<SessionHealth> {
        Ok(SessionHealth {
            cache_path: self.cache_path.to_string_lossy().to_string(),
            cache_entries: self.cache.len()?,
            cache_recovered: self.cache_recovered,
            config: self.config.public_profile(),
        })
    }

    pub fn load_records(&self, csv_path: &Path) -> AppResult<Vec<VenueRecord>> {
        let rows = ingestion::load_csv_file(csv_path)?;
        let records = self.normalizer.normalize_rows(&rows);
        debug!(
            path = %csv_path.display(),
            records = records.len(),
            "venue sheet normalized"
        );
        Ok(records)
    }

    pub async fn enrich(
        &self,
        records: &mut [VenueRecord],
        sink: &dyn ResolutionSink,
        cancel_flag: Option<Arc<AtomicBool>>,
    ) -> AppResult<EnrichmentStats> {
        self.enricher.enrich(records, sink, cancel_flag).await
    }

    pub fn report(&self, records: Vec<VenueRecord>, stats: EnrichmentStats) -> RunReport {
        let progress = ProgressSummary::from_records(&records);
        let city = self.config.default_city.as_str();
        let records = records
            .into_iter()
            .map(|record| DisplayVenue {
                tags: catalogue::tags(&record),
                maps_link: catalogue::maps_link(&record, city),
                on_map: record.is_coordinate_complete(),
                record,
            })
            .collect();
        RunReport {
            records,
            stats,
            progress,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayVenue {
    #[serde(flatten)]
    pub record: VenueRecord,
    pub tags: Vec<String>,
    pub maps_link: String,
    pub on_map: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub records: Vec<DisplayVenue>,
    pub stats: EnrichmentStats,
    pub progress: ProgressSummary,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: PathBuf,
    pub data_dir: PathBuf,
    pub overrides: Option<PathBuf>,
    /// Forces geocoding on regardless of the configured default.
    pub geocode: bool,
    pub limit: Option<usize>,
    pub import_cache: Option<PathBuf>,
    pub export_cache: Option<PathBuf>,
}

/// One map load: read the sheet, fill what the cache and budget allow, and
/// return the display-ready result.
pub async fn run(options: &RunOptions, cancel_flag: Arc<AtomicBool>) -> AppResult<RunReport> {
    let mut config = AppConfig::from_env();
    if let Some(path) = &options.overrides {
        config.apply_overrides(&AppConfig::load_overrides(path)?);
    }
    if options.geocode {
        config.geocode_enabled = true;
    }
    if let Some(limit) = options.limit {
        config.geocode_limit_per_load = limit;
    }

    let session = Session::initialize(&options.data_dir, config)?;
    if let Some(path) = &options.import_cache {
        let snapshot: CacheSnapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let written = session.cache().import_snapshot(&snapshot)?;
        info!(written, path = %path.display(), "cache snapshot imported");
    }

    let mut records = session.load_records(&options.input)?;
    let placed = |record: &VenueRecord| {
        debug!(record_id = record.id, name = %record.name, "venue placed on map");
    };
    let stats = session
        .enrich(&mut records, &placed, Some(cancel_flag))
        .await?;

    if let Some(path) = &options.export_cache {
        let snapshot = session.cache().export_snapshot()?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
        info!(entries = snapshot.len(), path = %path.display(), "cache snapshot exported");
    }

    Ok(session.report(records, stats))
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,barathon_lib=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}
