use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{trace, warn};

use crate::db;
use crate::errors::{AppError, AppResult};
use crate::venue::Coordinate;

/// Signature → coordinate, the portable form of a cache.
pub type CacheSnapshot = BTreeMap<String, Coordinate>;

/// Key-value store of resolved coordinates. Neither operation touches the
/// network; `store` must be durable by the time it returns.
pub trait CoordinateCache: Send + Sync {
    fn lookup(&self, signature: &str) -> AppResult<Option<Coordinate>>;
    fn store(&self, signature: &str, coordinate: Coordinate) -> AppResult<()>;
}

#[derive(Clone)]
pub struct SqliteCoordinateCache {
    db: Arc<Mutex<Connection>>,
    namespace: String,
}

impl SqliteCoordinateCache {
    pub fn new(db: Arc<Mutex<Connection>>, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    pub fn in_memory(namespace: impl Into<String>) -> AppResult<Self> {
        let connection = db::open_in_memory()?;
        Ok(Self::new(Arc::new(Mutex::new(connection)), namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> AppResult<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM coordinate_cache WHERE namespace = ?1",
            [&self.namespace],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        self.len().map(|len| len == 0)
    }

    pub fn export_snapshot(&self) -> AppResult<CacheSnapshot> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT signature, lat, lon FROM coordinate_cache WHERE namespace = ?1 ORDER BY signature",
        )?;
        let rows = stmt
            .query_map([&self.namespace], |row| {
                let signature: String = row.get(0)?;
                let lat: f64 = row.get(1)?;
                let lon: f64 = row.get(2)?;
                Ok((signature, lat, lon))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(signature, lat, lon)| {
                Coordinate::new(lat, lon).map(|coordinate| (signature, coordinate))
            })
            .collect())
    }

    /// Loads a snapshot, overwriting entries with the same signature.
    /// Returns how many entries were written.
    pub fn import_snapshot(&self, snapshot: &CacheSnapshot) -> AppResult<usize> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(UPSERT_ENTRY)?;
            for (signature, coordinate) in snapshot {
                if !coordinate.is_valid() {
                    warn!(signature, "skipping invalid coordinate in cache snapshot");
                    continue;
                }
                stmt.execute(params![
                    self.namespace,
                    signature,
                    coordinate.lat,
                    coordinate.lon
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}

const UPSERT_ENTRY: &str = "INSERT INTO coordinate_cache (namespace, signature, lat, lon, stored_at)
    VALUES (?1, ?2, ?3, ?4, DATETIME('now'))
    ON CONFLICT(namespace, signature) DO UPDATE SET
        lat = excluded.lat,
        lon = excluded.lon,
        stored_at = excluded.stored_at";

impl CoordinateCache for SqliteCoordinateCache {
    fn lookup(&self, signature: &str) -> AppResult<Option<Coordinate>> {
        let conn = self.db.lock();
        let stored: Option<(f64, f64)> = conn
            .query_row(
                "SELECT lat, lon FROM coordinate_cache WHERE namespace = ?1 AND signature = ?2",
                (&self.namespace, signature),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(stored.and_then(|(lat, lon)| {
            let coordinate = Coordinate::new(lat, lon);
            if coordinate.is_none() {
                warn!(signature, lat, lon, "ignoring invalid cached coordinate");
            }
            coordinate
        }))
    }

    fn store(&self, signature: &str, coordinate: Coordinate) -> AppResult<()> {
        if !coordinate.is_valid() {
            return Err(AppError::InvalidCoordinate {
                lat: coordinate.lat,
                lon: coordinate.lon,
            });
        }
        let conn = self.db.lock();
        conn.execute(
            UPSERT_ENTRY,
            params![self.namespace, signature, coordinate.lat, coordinate.lon],
        )?;
        trace!(signature, "coordinate cached");
        Ok(())
    }
}

/// Process-local cache, lost when the session ends.
#[derive(Default)]
pub struct MemoryCoordinateCache {
    entries: RwLock<HashMap<String, Coordinate>>,
}

impl MemoryCoordinateCache {
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            entries: RwLock::new(snapshot.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn export_snapshot(&self) -> CacheSnapshot {
        self.entries
            .read()
            .iter()
            .map(|(signature, coordinate)| (signature.clone(), *coordinate))
            .collect()
    }
}

impl CoordinateCache for MemoryCoordinateCache {
    fn lookup(&self, signature: &str) -> AppResult<Option<Coordinate>> {
        Ok(self.entries.read().get(signature).copied())
    }

    fn store(&self, signature: &str, coordinate: Coordinate) -> AppResult<()> {
        self.entries.write().insert(signature.to_string(), coordinate);
        Ok(())
    }
}
