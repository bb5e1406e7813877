use std::io;
use std::path::{Path, PathBuf};

use rusqlite::ffi::ErrorCode;
use rusqlite::{Connection, Error as SqliteError, OpenFlags};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: PathBuf,
}

pub struct DatabaseBootstrap {
    pub context: DatabaseContext,
    pub recovered: bool,
}

pub fn bootstrap<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<DatabaseBootstrap> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(database_file);

    match establish_context(&db_path) {
        Ok(context) => {
            info!(
                target: "database_bootstrap",
                path = %db_path.display(),
                "geocode cache store ready"
            );
            Ok(DatabaseBootstrap {
                context,
                recovered: false,
            })
        }
        Err(AppError::Database(err)) if should_attempt_recovery(&err, &db_path) => {
            warn!(
                target: "database_bootstrap",
                path = %db_path.display(),
                error = %err,
                "geocode cache store failed to open, recreating it"
            );
            recover_store(&db_path)?;
            let context = establish_context(&db_path)?;
            Ok(DatabaseBootstrap {
                context,
                recovered: true,
            })
        }
        Err(err) => Err(err),
    }
}

/// Session-only store with the same schema as the on-disk one.
pub fn open_in_memory() -> AppResult<Connection> {
    let connection = Connection::open_in_memory()?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn establish_context(db_path: &Path) -> AppResult<DatabaseContext> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(db_path, flags)?;
    apply_pragmas(&connection)?;
    run_migrations(&connection)?;

    Ok(DatabaseContext {
        connection,
        path: db_path.to_path_buf(),
    })
}

fn apply_pragmas(connection: &Connection) -> AppResult<()> {
    // FULL sync: a stored coordinate survives a crash right after `store`.
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS coordinate_cache (
            namespace TEXT NOT NULL,
            signature TEXT NOT NULL,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            stored_at TEXT NOT NULL DEFAULT (DATETIME('now')),
            PRIMARY KEY (namespace, signature)
        );
        "#,
    )?;
    Ok(())
}

fn should_attempt_recovery(err: &SqliteError, db_path: &Path) -> bool {
    if !db_path.exists() {
        return false;
    }

    match err {
        SqliteError::SqliteFailure(code, message) => {
            matches!(
                code.code,
                ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt
            ) || message
                .as_deref()
                .map(|msg| msg.contains("database disk image is malformed"))
                .unwrap_or(false)
        }
        _ => false,
    }
}

fn recover_store(db_path: &Path) -> AppResult<()> {
    remove_if_exists(db_path)?;
    remove_if_exists(&sidecar_path(db_path, "wal"))?;
    remove_if_exists(&sidecar_path(db_path, "shm"))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push("-");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runs_migrations_and_creates_tables() {
        let dir = tempdir().unwrap();
        let bootstrap = bootstrap(dir.path(), "test.db").unwrap();
        let ctx = bootstrap.context;

        let tables: i64 = ctx
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'coordinate_cache'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
        assert!(ctx.path.ends_with("test.db"));
        assert!(!bootstrap.recovered);
    }

    #[test]
    fn reopens_existing_store_without_recovery() {
        let dir = tempdir().unwrap();
        drop(bootstrap(dir.path(), "reopen.db").unwrap());

        let again = bootstrap(dir.path(), "reopen.db").unwrap();
        assert!(!again.recovered);
    }

    #[test]
    fn recovers_when_file_is_not_a_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.db");
        std::fs::write(&path, vec![0x42_u8; 4096]).unwrap();

        let recovered = bootstrap(dir.path(), "broken.db").unwrap();
        assert!(recovered.recovered);
        assert!(recovered.context.path.exists());
    }

    #[test]
    fn builds_sidecar_paths() {
        let path = Path::new("/tmp/cache.db");
        assert_eq!(sidecar_path(path, "wal"), PathBuf::from("/tmp/cache.db-wal"));
    }
}
