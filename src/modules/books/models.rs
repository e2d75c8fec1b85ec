use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use time::OffsetDateTime;

pub const TITLE_MAX_CHARS: usize = 255;
pub const AUTHOR_MAX_CHARS: usize = 255;
pub const GENRE_MAX_CHARS: usize = 100;

/// A stored book record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub published_year: Option<i32>,
    pub genre: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Book {
    /// Merge a patch into this record and stamp `updated_at`.
    ///
    /// `Unset` fields keep their value, `Null` clears an optional field. A
    /// `Null` title or author is rejected by [`UpdateBook::validate`] and
    /// leaves the field unchanged here.
    pub fn apply(&mut self, patch: UpdateBook, now: OffsetDateTime) {
        if let Patch::Value(title) = patch.title {
            self.title = title;
        }
        if let Patch::Value(author) = patch.author {
            self.author = author;
        }
        patch.published_year.merge_into(&mut self.published_year);
        patch.genre.merge_into(&mut self.genre);
        self.updated_at = now;
    }
}

/// Request model for creating a new book.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl CreateBook {
    /// Field-level problems with this payload, empty when it is acceptable.
    pub fn validate(&self) -> Vec<serde_json::Value> {
        let mut problems = Vec::new();
        check_required("title", &self.title, TITLE_MAX_CHARS, &mut problems);
        check_required("author", &self.author, AUTHOR_MAX_CHARS, &mut problems);
        if let Some(genre) = &self.genre {
            check_length("genre", genre, GENRE_MAX_CHARS, &mut problems);
        }
        problems
    }
}

/// A field in a partial update.
///
/// Distinguishes a field left out of the payload from one explicitly set to
/// `null`. Use with `#[serde(default)]` so omitted fields become `Unset`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Unset,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    /// Apply to a nullable field.
    pub fn merge_into(self, field: &mut Option<T>) {
        match self {
            Patch::Unset => {}
            Patch::Null => *field = None,
            Patch::Value(value) => *field = Some(value),
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

/// Request model for a partial update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UpdateBook {
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub author: Patch<String>,
    #[serde(default)]
    pub published_year: Patch<i32>,
    #[serde(default)]
    pub genre: Patch<String>,
}

impl UpdateBook {
    pub fn validate(&self) -> Vec<serde_json::Value> {
        let mut problems = Vec::new();

        for (field, patch, max) in [
            ("title", &self.title, TITLE_MAX_CHARS),
            ("author", &self.author, AUTHOR_MAX_CHARS),
        ] {
            match patch {
                Patch::Unset => {}
                Patch::Null => problems.push(json!({"field": field, "error": "may not be null"})),
                Patch::Value(value) => check_required(field, value, max, &mut problems),
            }
        }

        if let Patch::Value(genre) = &self.genre {
            check_length("genre", genre, GENRE_MAX_CHARS, &mut problems);
        }

        problems
    }
}

/// Response model: the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookResponse {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub published_year: Option<i32>,
    pub genre: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            published_year: book.published_year,
            genre: book.genre,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

/// Current UTC time at the microsecond precision both stores keep.
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

fn check_required(field: &str, value: &str, max: usize, problems: &mut Vec<serde_json::Value>) {
    if value.trim().is_empty() {
        problems.push(json!({"field": field, "error": "must not be empty"}));
    } else {
        check_length(field, value, max, problems);
    }
}

fn check_length(field: &str, value: &str, max: usize, problems: &mut Vec<serde_json::Value>) {
    if value.chars().count() > max {
        problems.push(json!({
            "field": field,
            "error": format!("must be at most {} characters", max)
        }));
    }
}
