use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{acquire_error, contains_pattern, BookRepository, RepositoryError};
use crate::modules::books::models::{self, Book, CreateBook, UpdateBook};

pub(super) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        title          VARCHAR(255) NOT NULL,
        author         VARCHAR(255) NOT NULL,
        published_year INTEGER,
        genre          VARCHAR(100),
        created_at     DATETIME NOT NULL,
        updated_at     DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_books_title ON books (title)",
    "CREATE INDEX IF NOT EXISTS ix_books_author ON books (author)",
    "CREATE INDEX IF NOT EXISTS ix_books_published_year ON books (published_year)",
    "CREATE INDEX IF NOT EXISTS ix_books_genre ON books (genre)",
];

const SELECT_BY_ID: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books WHERE id = ?";

const SELECT_PAGE: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books ORDER BY id LIMIT ? OFFSET ?";

const SELECT_MATCHING: &str = "SELECT id, title, author, published_year, genre, created_at, updated_at \
     FROM books \
     WHERE LOWER(title) LIKE LOWER(?) ESCAPE '!' \
        OR LOWER(author) LIKE LOWER(?) ESCAPE '!' \
        OR LOWER(genre) LIKE LOWER(?) ESCAPE '!' \
        OR CAST(published_year AS TEXT) LIKE ? ESCAPE '!' \
     ORDER BY id";

const INSERT: &str = "INSERT INTO books (title, author, published_year, genre, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?)";

const UPDATE: &str = "UPDATE books SET title = ?, author = ?, published_year = ?, genre = ?, updated_at = ? \
     WHERE id = ?";

const DELETE: &str = "DELETE FROM books WHERE id = ?";

const PROBE: &str = "SELECT id FROM books LIMIT 1";

// Writers take the lock up front; under WAL a deferred read-then-write
// transaction gets SQLITE_BUSY without honoring the busy timeout.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

/// Book storage in a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteBookRepository {
    pool: SqlitePool,
}

impl SqliteBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for SqliteBookRepository {
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

        Ok(Book {
            id: result.last_insert_rowid(),
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
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let mut book = sqlx::query_as::<_, Book>(SELECT_BY_ID)
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
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let book = sqlx::query_as::<_, Book>(SELECT_BY_ID)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::Patch;
    use bookshelf_db::Database;
    use bookshelf_kernel::settings::DatabaseSettings;

    async fn repository() -> SqliteBookRepository {
        let settings = DatabaseSettings {
            path: ":memory:".to_string(),
            ..DatabaseSettings::default()
        };
        let database = Database::connect(&settings).unwrap();
        database
            .apply_schema(&[("books".to_string(), crate::modules::books::repository::SCHEMA)])
            .await
            .unwrap();
        let Database::Sqlite(pool) = database else {
            panic!("expected a SQLite pool");
        };
        SqliteBookRepository::new(pool)
    }

    fn book(title: &str, author: &str, year: Option<i32>, genre: Option<&str>) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: author.to_string(),
            published_year: year,
            genre: genre.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = repository().await;
        let created = repo
            .create(book("Dune", "Frank Herbert", Some(1965), Some("Sci-Fi")))
            .await
            .unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.created_at, created.updated_at);

        let fetched = repo.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let repo = repository().await;
        let first = repo.create(book("A", "x", None, None)).await.unwrap();
        let second = repo.create(book("B", "y", None, None)).await.unwrap();
        repo.delete(second.id).await.unwrap();

        let third = repo.create(book("C", "z", None, None)).await.unwrap();
        assert!(third.id > second.id);
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn list_pages_in_id_order() {
        let repo = repository().await;
        assert!(repo.list(0, 100).await.unwrap().is_empty());

        for title in ["one", "two", "three", "four"] {
            repo.create(book(title, "anon", None, None)).await.unwrap();
        }

        let titles: Vec<_> = repo
            .list(1, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["two", "three"]);
        assert!(repo.list(10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_matches_any_field_case_insensitively() {
        let repo = repository().await;
        let dune = repo
            .create(book("Dune", "Frank Herbert", Some(1965), Some("Sci-Fi")))
            .await
            .unwrap();
        let emma = repo
            .create(book("Emma", "Jane Austen", Some(1815), None))
            .await
            .unwrap();
        let odds = repo
            .create(book("100% Pure", "Some_One", None, Some("Essays")))
            .await
            .unwrap();

        let ids = |books: Vec<Book>| books.into_iter().map(|b| b.id).collect::<Vec<_>>();

        assert_eq!(ids(repo.search("DUNE").await.unwrap()), vec![dune.id]);
        assert_eq!(ids(repo.search("austen").await.unwrap()), vec![emma.id]);
        assert_eq!(ids(repo.search("sci-fi").await.unwrap()), vec![dune.id]);
        assert_eq!(ids(repo.search("196").await.unwrap()), vec![dune.id]);
        assert_eq!(ids(repo.search("18").await.unwrap()), vec![emma.id]);
        assert_eq!(ids(repo.search("%").await.unwrap()), vec![odds.id]);
        assert_eq!(ids(repo.search("e_o").await.unwrap()), vec![odds.id]);
        assert_eq!(
            ids(repo.search("").await.unwrap()),
            vec![dune.id, emma.id, odds.id]
        );
        assert!(repo.search("tolkien").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_applies_partial_patch() {
        let repo = repository().await;
        let created = repo
            .create(book("Dune", "Frank Herbert", Some(1965), Some("Sci-Fi")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        let updated = repo
            .update(
                created.id,
                UpdateBook {
                    genre: Patch::Value("Science Fiction".to_string()),
                    published_year: Patch::Null,
                    ..UpdateBook::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Dune");
        assert_eq!(updated.author, "Frank Herbert");
        assert_eq!(updated.published_year, None);
        assert_eq!(updated.genre.as_deref(), Some("Science Fiction"));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        assert_eq!(repo.get(created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn empty_patch_still_refreshes_updated_at() {
        let repo = repository().await;
        let created = repo.create(book("Emma", "Jane Austen", None, None)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        let touched = repo.update(created.id, UpdateBook::default()).await.unwrap();
        assert_eq!(touched.title, created.title);
        assert_eq!(touched.created_at, created.created_at);
        assert!(touched.updated_at > created.updated_at);

        let stored = repo.get(created.id).await.unwrap();
        assert_eq!(stored.updated_at, touched.updated_at);
    }

    #[tokio::test]
    async fn search_matches_exact_non_ascii_text() {
        let repo = repository().await;
        let book = repo
            .create(book("École", "Émile Zola", None, Some("Roman")))
            .await
            .unwrap();

        for term in ["École", "Émile", "zola", "ÉCOLE", "roman"] {
            let found = repo.search(term).await.unwrap();
            assert_eq!(
                found.into_iter().map(|b| b.id).collect::<Vec<_>>(),
                vec![book.id],
                "term {term}"
            );
        }
    }

    #[tokio::test]
    async fn concurrent_updates_on_a_file_store_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DatabaseSettings {
            path: dir.path().join("books.db").to_string_lossy().into_owned(),
            ..DatabaseSettings::default()
        };
        let database = Database::connect(&settings).unwrap();
        database
            .apply_schema(&[("books".to_string(), crate::modules::books::repository::SCHEMA)])
            .await
            .unwrap();
        let Database::Sqlite(pool) = database.clone() else {
            panic!("expected a SQLite pool");
        };
        let repo = std::sync::Arc::new(SqliteBookRepository::new(pool));
        let created = repo.create(book("Dune", "Frank Herbert", None, None)).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for year in 0..40 {
            let repo = repo.clone();
            tasks.spawn(async move {
                repo.update(
                    created.id,
                    UpdateBook {
                        published_year: Patch::Value(1900 + year),
                        ..UpdateBook::default()
                    },
                )
                .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let stored = repo.get(created.id).await.unwrap();
        assert!(stored.published_year.is_some_and(|y| (1900..1940).contains(&y)));
        database.close().await;
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let repo = repository().await;
        assert!(matches!(
            repo.get(42).await,
            Err(RepositoryError::NotFound(42))
        ));
        assert!(matches!(
            repo.update(42, UpdateBook::default()).await,
            Err(RepositoryError::NotFound(42))
        ));
        assert!(matches!(
            repo.delete(42).await,
            Err(RepositoryError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn delete_returns_final_state() {
        let repo = repository().await;
        let created = repo.create(book("Dune", "Frank Herbert", None, None)).await.unwrap();

        let deleted = repo.delete(created.id).await.unwrap();
        assert_eq!(deleted, created);
        assert!(matches!(
            repo.get(created.id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn probe_fails_without_schema() {
        let settings = DatabaseSettings {
            path: ":memory:".to_string(),
            ..DatabaseSettings::default()
        };
        let Database::Sqlite(pool) = Database::connect(&settings).unwrap() else {
            panic!("expected a SQLite pool");
        };
        let repo = SqliteBookRepository::new(pool);

        let err = repo.probe().await.unwrap_err();
        assert!(!err.is_connection_error());
    }
}
