//! Persistence for book records.
//!
//! One [`BookRepository`] implementation per backend. Every call borrows a
//! pooled connection (or a single-record transaction) for its own duration
//! only; the sqlx guards return it to the pool on every exit path.

mod mysql;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use bookshelf_db::Database;
use bookshelf_kernel::Schema;

use super::models::{Book, CreateBook, UpdateBook};

pub use mysql::MySqlBookRepository;
pub use sqlite::SqliteBookRepository;

const LIKE_ESCAPE: char = '!';

/// Table bootstrap for both backends.
pub const SCHEMA: Schema = Schema {
    id: "001_books",
    sqlite: sqlite::SCHEMA,
    mysql: mysql::SCHEMA,
};

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("Book {0} not found")]
    NotFound(i64),

    #[error("store assigned an id outside the supported range: {0}")]
    IdOutOfRange(u64),

    #[error("all {0} pooled connections stayed busy")]
    PoolExhausted(u32),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    /// Whether the store could not be reached at all.
    pub fn is_connection_error(&self) -> bool {
        match self {
            RepositoryError::Database(err) => bookshelf_db::is_connection_error(err),
            _ => false,
        }
    }
}

#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Insert a record; the store assigns its id.
    async fn create(&self, book: CreateBook) -> Result<Book, RepositoryError>;

    /// Records in ascending id order, skipping `skip` and returning at most `limit`.
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Book>, RepositoryError>;

    async fn get(&self, id: i64) -> Result<Book, RepositoryError>;

    /// Case-insensitive substring match over title, author, genre and the
    /// decimal form of the published year, in ascending id order.
    async fn search(&self, term: &str) -> Result<Vec<Book>, RepositoryError>;

    /// Apply a partial update and return the stored result.
    async fn update(&self, id: i64, patch: UpdateBook) -> Result<Book, RepositoryError>;

    /// Remove a record permanently, returning its final state.
    async fn delete(&self, id: i64) -> Result<Book, RepositoryError>;

    /// Trivial read used by the health check.
    async fn probe(&self) -> Result<(), RepositoryError>;
}

/// Classify a failed `pool.acquire()`. A timeout while the pool still holds
/// live connections means they were all busy, not that the store is down.
pub(crate) fn acquire_error(err: sqlx::Error, live_connections: u32) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut if live_connections > 0 => {
            RepositoryError::PoolExhausted(live_connections)
        }
        other => RepositoryError::Database(other),
    }
}

/// Repository for whichever backend `database` points at.
pub fn for_database(database: &Database) -> Arc<dyn BookRepository> {
    match database {
        Database::Sqlite(pool) => Arc::new(SqliteBookRepository::new(pool.clone())),
        Database::Mysql(pool) => Arc::new(MySqlBookRepository::new(pool.clone())),
    }
}

/// `LIKE` pattern matching `term` anywhere, with wildcards in `term` taken
/// literally. Pair with `ESCAPE '!'`. Case folding is left to the store's
/// `LOWER()`, applied to both the column and the pattern.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_') || ch == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_wraps_term_unchanged() {
        assert_eq!(contains_pattern("DuNe"), "%DuNe%");
        assert_eq!(contains_pattern("École"), "%École%");
        assert_eq!(contains_pattern(""), "%%");
    }

    #[test]
    fn pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("100%"), "%100!%%");
        assert_eq!(contains_pattern("a_b"), "%a!_b%");
        assert_eq!(contains_pattern("wow!"), "%wow!!%");
    }

    #[test]
    fn only_store_errors_can_be_connection_errors() {
        assert!(!RepositoryError::NotFound(3).is_connection_error());
        assert!(RepositoryError::Database(sqlx::Error::PoolClosed).is_connection_error());
        assert!(!RepositoryError::Database(sqlx::Error::RowNotFound).is_connection_error());
        assert!(!RepositoryError::PoolExhausted(30).is_connection_error());
    }

    #[test]
    fn busy_pool_timeout_is_not_a_connection_error() {
        let exhausted = acquire_error(sqlx::Error::PoolTimedOut, 4);
        assert!(matches!(exhausted, RepositoryError::PoolExhausted(4)));
        assert!(!exhausted.is_connection_error());

        let unreachable = acquire_error(sqlx::Error::PoolTimedOut, 0);
        assert!(unreachable.is_connection_error());

        let closed = acquire_error(sqlx::Error::PoolClosed, 2);
        assert!(closed.is_connection_error());
    }
}
