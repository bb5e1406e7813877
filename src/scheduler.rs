use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::cache::CoordinateCache;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::evaluator::select_best;
use crate::geocoder::GeocodeService;
use crate::venue::{Coordinate, VenueRecord};

/// Receives each record as soon as it becomes coordinate-complete, in
/// resolution order.
pub trait ResolutionSink: Send + Sync {
    fn on_resolved(&self, record: &VenueRecord);
}

impl<F> ResolutionSink for F
where
    F: Fn(&VenueRecord) + Send + Sync,
{
    fn on_resolved(&self, record: &VenueRecord) {
        self(record)
    }
}

/// Forwards resolved records to an async consumer.
pub struct ChannelSink {
    sender: UnboundedSender<VenueRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<VenueRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ResolutionSink for ChannelSink {
    fn on_resolved(&self, record: &VenueRecord) {
        if self.sender.send(record.clone()).is_err() {
            trace!(record_id = record.id, "resolution receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnrichmentLimits {
    pub enabled: bool,
    /// Newly geocoded records per run; cache hits are free.
    pub max_new_per_run: usize,
    pub delay: Duration,
}

impl EnrichmentLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.geocode_enabled,
            max_new_per_run: config.geocode_limit_per_load,
            delay: config.geocode_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentStats {
    pub pending: usize,
    pub considered: usize,
    pub cache_hits: usize,
    pub geocoded: usize,
    pub soft_misses: usize,
    pub lookup_failures: usize,
    pub deferred: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EnrichmentStats {
    fn start(pending: usize) -> Self {
        let now = Utc::now();
        Self {
            pending,
            considered: 0,
            cache_hits: 0,
            geocoded: 0,
            soft_misses: 0,
            lookup_failures: 0,
            deferred: 0,
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self) -> Self {
        self.deferred = self.pending.saturating_sub(self.considered);
        self.finished_at = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Cached(Coordinate),
    Geocoded {
        coordinate: Coordinate,
        query_index: usize,
    },
    NoAcceptableMatch,
}

/// Drains coordinate-incomplete records one at a time: cache first, then the
/// geocoder with a fixed gap between requests.
pub struct GeocodeEnricher {
    cache: Arc<dyn CoordinateCache>,
    lookup: GeocodeService,
    limits: EnrichmentLimits,
    throttle: Throttle,
    guard: AsyncMutex<()>,
}

impl GeocodeEnricher {
    pub fn new(
        cache: Arc<dyn CoordinateCache>,
        lookup: GeocodeService,
        limits: EnrichmentLimits,
    ) -> Self {
        Self {
            cache,
            lookup,
            throttle: Throttle::new(limits.delay),
            limits,
            guard: AsyncMutex::new(()),
        }
    }

    pub fn limits(&self) -> EnrichmentLimits {
        self.limits
    }

    /// Runs one pass over `records`. Fails only with [`AppError::Busy`] when
    /// another pass is still draining; per-record problems are logged and
    /// counted instead.
    pub async fn enrich(
        &self,
        records: &mut [VenueRecord],
        sink: &dyn ResolutionSink,
        cancel_flag: Option<Arc<AtomicBool>>,
    ) -> AppResult<EnrichmentStats> {
        let _lock = self.guard.try_lock().map_err(|_| AppError::Busy)?;

        let pending = records
            .iter()
            .filter(|record| !record.is_coordinate_complete())
            .count();
        let mut stats = EnrichmentStats::start(pending);
        if !self.limits.enabled {
            debug!(pending, "geocoding disabled; leaving records untouched");
            return Ok(stats.finish());
        }

        for record in records
            .iter_mut()
            .filter(|record| !record.is_coordinate_complete())
        {
            if cancel_flag
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                stats.cancelled = true;
                break;
            }
            if stats.geocoded >= self.limits.max_new_per_run {
                break;
            }
            stats.considered += 1;

            match self.resolve(record, &mut stats).await {
                Resolution::Cached(coordinate) => {
                    record.set_coordinate(coordinate);
                    stats.cache_hits += 1;
                    trace!(record_id = record.id, "coordinate served from cache");
                    sink.on_resolved(record);
                }
                Resolution::Geocoded {
                    coordinate,
                    query_index,
                } => {
                    record.set_coordinate(coordinate);
                    if let Err(err) = self.cache.store(&record.signature(), coordinate) {
                        warn!(?err, record_id = record.id, "failed to cache resolved coordinate");
                    }
                    stats.geocoded += 1;
                    debug!(
                        record_id = record.id,
                        query_index,
                        lat = coordinate.lat,
                        lon = coordinate.lon,
                        "venue geocoded"
                    );
                    sink.on_resolved(record);
                }
                Resolution::NoAcceptableMatch => {
                    stats.soft_misses += 1;
                    debug!(
                        record_id = record.id,
                        name = %record.name,
                        queries = record.candidate_queries().len(),
                        "no acceptable geocoder match; will retry on a later run"
                    );
                }
            }
        }

        let stats = stats.finish();
        info!(
            target: "enrichment",
            pending = stats.pending,
            cache_hits = stats.cache_hits,
            geocoded = stats.geocoded,
            soft_misses = stats.soft_misses,
            lookup_failures = stats.lookup_failures,
            deferred = stats.deferred,
            cancelled = stats.cancelled,
            "enrichment run finished"
        );
        Ok(stats)
    }

    async fn resolve(&self, record: &VenueRecord, stats: &mut EnrichmentStats) -> Resolution {
        let signature = record.signature();
        match self.cache.lookup(&signature) {
            Ok(Some(coordinate)) => return Resolution::Cached(coordinate),
            Ok(None) => {}
            Err(err) => warn!(?err, record_id = record.id, "cache lookup failed; treating as miss"),
        }

        for (query_index, query) in record.candidate_queries().iter().enumerate() {
            self.throttle.wait().await;
            match self.lookup.search(query).await {
                Ok(candidates) => {
                    if let Some(selection) = select_best(&candidates) {
                        return Resolution::Geocoded {
                            coordinate: selection.coordinate,
                            query_index,
                        };
                    }
                    trace!(
                        record_id = record.id,
                        query_index,
                        returned = candidates.len(),
                        "no candidate accepted for query"
                    );
                }
                Err(err) => {
                    stats.lookup_failures += 1;
                    warn!(?err, record_id = record.id, query_index, "geocode lookup failed");
                }
            }
        }
        Resolution::NoAcceptableMatch
    }
}

/// Keeps consecutive geocoder requests at least `interval` apart, across runs.
struct Throttle {
    interval: Duration,
    last_request: AsyncMutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_request.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}
