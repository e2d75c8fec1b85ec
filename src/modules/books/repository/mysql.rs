use async_trait::async_trait;
use sqlx::MySqlPool;

use super::{acquire_error, contains_pattern, BookRepository, RepositoryError};
use crate::modules::books::models::{self, Book, CreateBook, UpdateBook};

// MySQL has no `CREATE INDEX IF NOT EXISTS`, so indexes live in the table
// definition.
pub(super) const SCHEMA: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS books (
        id             BIGINT       NOT NULL AUTO_INCREMENT,
        title          VARCHAR(255) NOT NULL,
        author         VARCHAR(255) NOT NULL,
        published_year INT          NULL,
        genre          VARCHAR(100) NULL,
        created_at     TIMESTAMP(6) NOT NULL,
        updated_at     TIMESTAMP(6) NOT NULL,
        PRIMARY KEY (id),
        INDEX ix_books_title (title),
        INDEX ix_books_author (author),
        INDEX ix_books_published_year (published_year),
        INDEX ix_books_genre (genre)
    ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4
    "#];

const SELECT_BY_ID: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books WHERE id = ?";

const SELECT_FOR_UPDATE: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books WHERE id = ? FOR UPDATE";

const SELECT_PAGE: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books ORDER BY id LIMIT ? OFFSET ?";

const SELECT_MATCHING: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books \
     WHERE LOWER(title) LIKE LOWER(?) ESCAPE '!' \
        OR LOWER(author) LIKE LOWER(?) ESCAPE '!' \
        OR LOWER(genre) LIKE LOWER(?) ESCAPE '!' \
        OR CAST(published_year AS CHAR) LIKE ? ESCAPE '!' \
     ORDER BY id";

const INSERT: &str = "INSERT INTO books (title, author, published_year, genre, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?)";

const UPDATE: &str = "UPDATE books SET title = ?, author = ?, published_year = ?, genre = ?, updated_at = ? \
     WHERE id = ?";

const DELETE: &str = "DELETE FROM books WHERE id = ?";

const PROBE: &str = "SELECT id FROM books LIMIT 1";

/// Book storage on a MySQL (or MariaDB) server.
#[derive(Debug, Clone)]
pub struct MySqlBookRepository {
    pool: MySqlPool,
}

impl MySqlBookRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for MySqlBookRepository {
    async fn create(&self, book: CreateBook) -> Result<Book, RepositoryError> {
        let now = models::now();
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(INSERT)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.published_year)
            .bind(&book.genre)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        let assigned = result.last_insert_id();
        let id = i64::try_from(assigned).map_err(|_| RepositoryError::IdOutOfRange(assigned))?;

        Ok(Book {
            id,
            title: book.title,
            author: book.author,
            published_year: book.published_year,
            genre: book.genre,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Book>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let books = sqlx::query_as::<_, Book>(SELECT_PAGE)
            .bind(limit)
            .bind(skip)
            .fetch_all(&mut *conn)
            .await?;
        Ok(books)
    }

    async fn get(&self, id: i64) -> Result<Book, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query_as::<_, Book>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn search(&self, term: &str) -> Result<Vec<Book>, RepositoryError> {
        let pattern = contains_pattern(term);
        let mut conn = self.pool.acquire().await?;
        let books = sqlx::query_as::<_, Book>(SELECT_MATCHING)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&mut *conn)
            .await?;
        Ok(books)
    }

    async fn update(&self, id: i64, patch: UpdateBook) -> Result<Book, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut book = sqlx::query_as::<_, Book>(SELECT_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;

        book.apply(patch, models::now());

        sqlx::query(UPDATE)
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.published_year)
            .bind(&book.genre)
            .bind(book.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(book)
    }

    async fn delete(&self, id: i64) -> Result<Book, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(SELECT_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;

        sqlx::query(DELETE).bind(id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(book)
    }

    async fn probe(&self) -> Result<(), RepositoryError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|err| acquire_error(err, self.pool.size()))?;
        sqlx::query(PROBE).fetch_optional(&mut *conn).await?;
        Ok(())
    }
}
