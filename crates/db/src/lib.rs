//! Connection pools for the relational stores backing bookshelf.
//!
//! A [`Database`] is created once at startup from [`DatabaseSettings`] and
//! cloned into whatever needs it; clones share the same underlying pool.
//! Callers borrow connections per operation (`pool.acquire()` or
//! `pool.begin()`), and the guards hand them back to the pool on drop.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use bookshelf_kernel::settings::{DatabaseBackend, DatabaseSettings};
use bookshelf_kernel::Schema;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool};
use sqlx::pool::PoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

/// SQLite result code for "unable to open database file".
const SQLITE_CANTOPEN: &str = "14";

/// Pooled handle to the configured store.
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

impl Database {
    /// Build a lazily connecting pool for the configured backend.
    ///
    /// No connection is opened here, so an unreachable server surfaces on
    /// first use rather than at startup. Must be called from within a Tokio
    /// runtime.
    pub fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let database = match settings.backend {
            DatabaseBackend::Sqlite => Database::Sqlite(sqlite_pool(settings)?),
            DatabaseBackend::Mysql => Database::Mysql(mysql_pool(settings)),
        };

        tracing::info!(
            target: "bookshelf-db",
            backend = settings.backend.display_name(),
            max_connections = settings.max_connections(),
            "database pool configured"
        );

        Ok(database)
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Database::Sqlite(_) => DatabaseBackend::Sqlite,
            Database::Mysql(_) => DatabaseBackend::Mysql,
        }
    }

    /// Run every schema statement for this backend, in order.
    pub async fn apply_schema(&self, schema: &[(String, Schema)]) -> anyhow::Result<()> {
        let backend = self.backend();

        for (module, entry) in schema {
            tracing::info!(
                target: "bookshelf-db",
                module = %module,
                schema = entry.id,
                "applying schema"
            );

            for statement in entry.statements(backend) {
                self.execute_raw(statement).await.with_context(|| {
                    format!("failed to apply schema '{}' for module '{}'", entry.id, module)
                })?;
            }
        }

        Ok(())
    }

    async fn execute_raw(&self, sql: &str) -> Result<(), sqlx::Error> {
        match self {
            Database::Sqlite(pool) => sqlx::raw_sql(sql).execute(pool).await.map(|_| ()),
            Database::Mysql(pool) => sqlx::raw_sql(sql).execute(pool).await.map(|_| ()),
        }
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        match self {
            Database::Sqlite(pool) => pool.close().await,
            Database::Mysql(pool) => pool.close().await,
        }
        tracing::info!(target: "bookshelf-db", "database pool closed");
    }
}

fn pool_options<DB: sqlx::Database>(settings: &DatabaseSettings) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .max_connections(settings.max_connections())
        .max_lifetime(Duration::from_secs(settings.pool_recycle_secs))
        .test_before_acquire(settings.pool_pre_ping)
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
}

fn sqlite_pool(settings: &DatabaseSettings) -> anyhow::Result<SqlitePool> {
    if settings.is_in_memory() {
        // Every connection to `:memory:` is a separate database, so the pool
        // holds exactly one and never retires it.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory SQLite options")?;
        let pool = PoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(options);
        return Ok(pool);
    }

    let options = SqliteConnectOptions::new()
        .filename(&settings.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    Ok(pool_options(settings).connect_lazy_with(options))
}

fn mysql_pool(settings: &DatabaseSettings) -> MySqlPool {
    let options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.name);

    pool_options(settings).connect_lazy_with(options)
}

/// Whether an error means the store could not be reached at all, as opposed
/// to a failed statement on a working connection.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().as_deref() == Some(SQLITE_CANTOPEN),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: Schema = Schema {
        id: "001_init",
        sqlite: &[
            "CREATE TABLE IF NOT EXISTS probe (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT NOT NULL)",
            "CREATE INDEX IF NOT EXISTS ix_probe_label ON probe (label)",
        ],
        mysql: &[],
    };

    fn in_memory() -> DatabaseSettings {
        DatabaseSettings {
            path: ":memory:".to_string(),
            ..DatabaseSettings::default()
        }
    }

    #[tokio::test]
    async fn in_memory_schema_is_idempotent_and_shared() {
        let database = Database::connect(&in_memory()).unwrap();
        assert_eq!(database.backend(), DatabaseBackend::Sqlite);

        let schema = vec![("probe".to_string(), SCHEMA)];
        database.apply_schema(&schema).await.unwrap();
        database.apply_schema(&schema).await.unwrap();

        let Database::Sqlite(pool) = &database else {
            panic!("expected a SQLite pool");
        };
        sqlx::query("INSERT INTO probe (label) VALUES (?)")
            .bind("first")
            .execute(pool)
            .await
            .unwrap();

        // A clone shares the single in-memory connection.
        let Database::Sqlite(clone) = database.clone() else {
            panic!("expected a SQLite pool");
        };
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM probe")
            .fetch_one(&clone)
            .await
            .unwrap();
        assert_eq!(count, 1);

        database.close().await;
    }

    #[tokio::test]
    async fn file_backed_store_is_created_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.db");
        let settings = DatabaseSettings {
            path: path.to_string_lossy().into_owned(),
            ..DatabaseSettings::default()
        };

        let database = Database::connect(&settings).unwrap();
        assert!(!path.exists());

        database
            .apply_schema(&[("probe".to_string(), SCHEMA)])
            .await
            .unwrap();
        assert!(path.exists());

        database.close().await;
    }

    #[tokio::test]
    async fn closed_pool_reports_connection_error() {
        let database = Database::connect(&in_memory()).unwrap();
        database.close().await;

        let Database::Sqlite(pool) = &database else {
            panic!("expected a SQLite pool");
        };
        let err = sqlx::query("SELECT 1").execute(pool).await.unwrap_err();
        assert!(is_connection_error(&err));
    }

    #[tokio::test]
    async fn refused_connections_give_up_at_acquire_timeout() {
        let settings = DatabaseSettings {
            backend: DatabaseBackend::Mysql,
            host: "127.0.0.1".to_string(),
            port: 1,
            acquire_timeout_ms: 200,
            ..DatabaseSettings::default()
        };
        let Database::Mysql(pool) = Database::connect(&settings).unwrap() else {
            panic!("expected a MySQL pool");
        };

        let started = std::time::Instant::now();
        let err = pool.acquire().await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(is_connection_error(&err), "unexpected error: {err}");
    }

    #[test]
    fn statement_errors_are_not_connection_errors() {
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
    }
}
