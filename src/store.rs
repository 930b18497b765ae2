//! SQLite-backed storage for book records, their embeddings, the index
//! freshness marker and recommendation feedback.
//!
//! Every mutating call commits before it returns.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;

use crate::model::{Book, BookDraft, FeedbackRecord, Rating};
use crate::semantic::{content_fingerprint, decode_embedding_blob, encode_embedding_blob};
use crate::util::now_utc_string;

pub const STORE_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize stored list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no book with id '{0}'")]
    BookNotFound(String),

    #[error("embedding blob for '{book_id}' is malformed")]
    CorruptEmbedding { book_id: String },

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("database schema version {found} is not supported (expected {STORE_SCHEMA_VERSION})")]
    SchemaVersion { found: String },
}

/// An embedding whose model and content hash match the current book.
#[derive(Debug, Clone, PartialEq)]
pub struct FreshEmbedding {
    pub book_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub books: i64,
    pub embeddings: i64,
    pub feedback: i64,
}

pub struct MetadataStore {
    connection: Mutex<Connection>,
}

struct BookRow {
    id: String,
    title: String,
    authors: String,
    description: Option<String>,
    subjects: Option<String>,
    isbns: Option<String>,
    cover_id: Option<i64>,
    work_key: Option<String>,
    content_hash: Option<String>,
}

const BOOK_COLUMNS: &str =
    "b.id, b.title, b.authors, b.description, b.subjects, b.isbns, b.cover_id, b.work_key, b.content_hash";

impl BookRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            authors: row.get(2)?,
            description: row.get(3)?,
            subjects: row.get(4)?,
            isbns: row.get(5)?,
            cover_id: row.get(6)?,
            work_key: row.get(7)?,
            content_hash: row.get(8)?,
        })
    }

    fn into_book(self) -> Result<Book, StoreError> {
        Ok(Book {
            id: self.id,
            title: self.title,
            authors: decode_list(Some(&self.authors))?,
            description: self.description,
            subjects: decode_list(self.subjects.as_deref())?,
            isbns: decode_list(self.isbns.as_deref())?,
            cover_id: self.cover_id,
            work_key: self.work_key,
            content_hash: self.content_hash.unwrap_or_default(),
        })
    }
}

fn decode_list(raw: Option<&str>) -> Result<Vec<String>, StoreError> {
    match raw {
        Some(value) if !value.trim().is_empty() => Ok(serde_json::from_str(value)?),
        _ => Ok(Vec::new()),
    }
}

impl MetadataStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let connection = Connection::open(db_path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.pragma_update(None, "foreign_keys", "ON")?;
        ensure_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }

    // --- books ---

    /// Inserts or replaces a book and returns the stored record. The content
    /// hash is recomputed from description and subjects on every call.
    pub fn upsert_book(&self, draft: &BookDraft) -> Result<Book, StoreError> {
        let content_hash = content_fingerprint(draft.description.as_deref(), &draft.subjects);
        let connection = self.lock()?;
        connection.execute(
            "
            INSERT INTO books(id, title, authors, description, subjects, isbns, cover_id, work_key, content_hash)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
              title=excluded.title,
              authors=excluded.authors,
              description=excluded.description,
              subjects=excluded.subjects,
              isbns=excluded.isbns,
              cover_id=excluded.cover_id,
              work_key=excluded.work_key,
              content_hash=excluded.content_hash
            ",
            params![
                draft.id,
                draft.title,
                serde_json::to_string(&draft.authors)?,
                draft.description,
                serde_json::to_string(&draft.subjects)?,
                serde_json::to_string(&draft.isbns)?,
                draft.cover_id,
                draft.work_key,
                content_hash,
            ],
        )?;

        Ok(Book {
            id: draft.id.clone(),
            title: draft.title.clone(),
            authors: draft.authors.clone(),
            description: draft.description.clone(),
            subjects: draft.subjects.clone(),
            isbns: draft.isbns.clone(),
            cover_id: draft.cover_id,
            work_key: draft.work_key.clone(),
            content_hash,
        })
    }

    pub fn get_book(&self, book_id: &str) -> Result<Option<Book>, StoreError> {
        let connection = self.lock()?;
        let row = connection
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = ?1"),
                [book_id],
                BookRow::from_row,
            )
            .optional()?;

        row.map(BookRow::into_book).transpose()
    }

    pub fn list_books(&self) -> Result<Vec<Book>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books b ORDER BY b.title ASC, b.id ASC"
        ))?;
        let rows = statement
            .query_map([], BookRow::from_row)?
            .collect::<rusqlite::Result<Vec<BookRow>>>()?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    /// Removes a book and its embedding. Returns whether the book existed.
    pub fn delete_book(&self, book_id: &str) -> Result<bool, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        tx.execute("DELETE FROM embeddings WHERE book_id = ?1", [book_id])?;
        let removed = tx.execute("DELETE FROM books WHERE id = ?1", [book_id])?;
        tx.commit()?;

        Ok(removed > 0)
    }

    // --- embeddings ---

    /// Replaces the embedding of an existing book. Orphan embeddings are
    /// refused with [`StoreError::BookNotFound`].
    pub fn upsert_embedding(
        &self,
        book_id: &str,
        vector: &[f32],
        model_id: &str,
        content_hash: &str,
    ) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let exists = connection
            .query_row("SELECT 1 FROM books WHERE id = ?1", [book_id], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::BookNotFound(book_id.to_string()));
        }

        connection.execute(
            "
            INSERT INTO embeddings(book_id, embedding, embedding_dim, model_id, content_hash, generated_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(book_id) DO UPDATE SET
              embedding=excluded.embedding,
              embedding_dim=excluded.embedding_dim,
              model_id=excluded.model_id,
              content_hash=excluded.content_hash,
              generated_at=excluded.generated_at
            ",
            params![
                book_id,
                encode_embedding_blob(vector),
                vector.len() as i64,
                model_id,
                content_hash,
                now_utc_string(),
            ],
        )?;

        Ok(())
    }

    pub fn get_embedding(&self, book_id: &str) -> Result<Option<Vec<f32>>, StoreError> {
        let connection = self.lock()?;
        let blob = connection
            .query_row(
                "SELECT embedding FROM embeddings WHERE book_id = ?1",
                [book_id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;

        blob.map(|blob| decode_or_corrupt(book_id, &blob)).transpose()
    }

    pub fn list_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
        let connection = self.lock()?;
        let mut statement =
            connection.prepare("SELECT book_id, embedding FROM embeddings ORDER BY book_id ASC")?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, Vec<u8>)>>>()?;

        rows.into_iter()
            .map(|(book_id, blob)| {
                let vector = decode_or_corrupt(&book_id, &blob)?;
                Ok((book_id, vector))
            })
            .collect()
    }

    /// Embeddings produced by `model_id` from the book's current content,
    /// ordered by book id. This is exactly the set the vector index may hold.
    pub fn list_fresh_embeddings(&self, model_id: &str) -> Result<Vec<FreshEmbedding>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "
            SELECT e.book_id, e.embedding, e.model_id, e.content_hash
            FROM embeddings e
            JOIN books b ON b.id = e.book_id
            WHERE e.model_id = ?1 AND e.content_hash = b.content_hash
            ORDER BY e.book_id ASC
            ",
        )?;
        let rows = statement
            .query_map([model_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<(String, Vec<u8>, String, String)>>>()?;

        rows.into_iter()
            .map(|(book_id, blob, model_id, content_hash)| {
                let vector = decode_or_corrupt(&book_id, &blob)?;
                Ok(FreshEmbedding {
                    book_id,
                    vector,
                    model_id,
                    content_hash,
                })
            })
            .collect()
    }

    /// Books with no embedding, an embedding from another model, or an
    /// embedding of outdated content.
    pub fn find_stale_books(&self, model_id: &str) -> Result<Vec<Book>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(&format!(
            "
            SELECT {BOOK_COLUMNS}
            FROM books b
            LEFT JOIN embeddings e ON e.book_id = b.id
            WHERE e.book_id IS NULL
               OR e.model_id != ?1
               OR e.content_hash != b.content_hash
            ORDER BY b.id ASC
            "
        ))?;
        let rows = statement
            .query_map([model_id], BookRow::from_row)?
            .collect::<rusqlite::Result<Vec<BookRow>>>()?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    // --- index state ---

    pub fn freshness_marker(&self) -> Result<Option<String>, StoreError> {
        let connection = self.lock()?;
        let marker = connection
            .query_row(
                "SELECT last_rebuild_hash FROM index_state WHERE id = 1",
                [],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;

        Ok(marker.flatten())
    }

    pub fn set_freshness_marker(&self, rebuild_hash: &str) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection.execute(
            "
            INSERT INTO index_state(id, last_rebuild_hash, updated_at)
            VALUES(1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
              last_rebuild_hash=excluded.last_rebuild_hash,
              updated_at=excluded.updated_at
            ",
            params![rebuild_hash, now_utc_string()],
        )?;
        Ok(())
    }

    // --- feedback ---

    pub fn append_feedback(
        &self,
        book_id: &str,
        rating: Rating,
        source_book_ids: &[String],
        source_prompt: Option<&str>,
    ) -> Result<i64, StoreError> {
        let connection = self.lock()?;
        connection.execute(
            "
            INSERT INTO recommendation_feedback(book_id, rating, source_book_ids, source_prompt, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ",
            params![
                book_id,
                rating.as_i64(),
                serde_json::to_string(source_book_ids)?,
                source_prompt,
                now_utc_string(),
            ],
        )?;

        let id = connection.last_insert_rowid();
        debug!(feedback_id = id, book_id, "feedback stored");
        Ok(id)
    }

    pub fn list_feedback(&self) -> Result<Vec<FeedbackRecord>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "
            SELECT id, book_id, rating, source_book_ids, source_prompt, created_at
            FROM recommendation_feedback
            ORDER BY id ASC
            ",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::<FeedbackRecord>::with_capacity(rows.len());
        for (id, book_id, rating, sources, source_prompt, created_at) in rows {
            // CHECK constraint keeps ratings at +1/-1.
            let rating = Rating::try_from(rating).unwrap_or(Rating::Down);
            out.push(FeedbackRecord {
                id,
                book_id,
                rating,
                source_book_ids: decode_list(sources.as_deref())?,
                source_prompt,
                created_at,
            });
        }
        Ok(out)
    }

    pub fn counts(&self) -> Result<StoreCounts, StoreError> {
        let connection = self.lock()?;
        let count = |sql: &str| connection.query_row(sql, [], |row| row.get::<_, i64>(0));

        Ok(StoreCounts {
            books: count("SELECT COUNT(*) FROM books")?,
            embeddings: count("SELECT COUNT(*) FROM embeddings")?,
            feedback: count("SELECT COUNT(*) FROM recommendation_feedback")?,
        })
    }
}

fn decode_or_corrupt(book_id: &str, blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    decode_embedding_blob(blob).ok_or_else(|| StoreError::CorruptEmbedding {
        book_id: book_id.to_string(),
    })
}

fn ensure_schema(connection: &Connection) -> Result<(), StoreError> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS books (
          id TEXT PRIMARY KEY,
          title TEXT NOT NULL,
          authors TEXT NOT NULL,
          description TEXT,
          subjects TEXT,
          isbns TEXT,
          cover_id INTEGER,
          work_key TEXT,
          content_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS embeddings (
          book_id TEXT PRIMARY KEY,
          embedding BLOB NOT NULL,
          embedding_dim INTEGER NOT NULL,
          model_id TEXT NOT NULL,
          content_hash TEXT NOT NULL,
          generated_at TEXT NOT NULL,
          FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS index_state (
          id INTEGER PRIMARY KEY CHECK (id = 1),
          last_rebuild_hash TEXT,
          updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS recommendation_feedback (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          book_id TEXT NOT NULL,
          rating INTEGER NOT NULL CHECK (rating IN (-1, 1)),
          source_book_ids TEXT,
          source_prompt TEXT,
          created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
        CREATE INDEX IF NOT EXISTS idx_feedback_book ON recommendation_feedback(book_id);
        ",
    )?;

    let found = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match found {
        Some(found) if found == STORE_SCHEMA_VERSION => {}
        Some(found) => return Err(StoreError::SchemaVersion { found }),
        None => {
            connection.execute(
                "INSERT INTO metadata(key, value) VALUES('schema_version', ?1)",
                [STORE_SCHEMA_VERSION],
            )?;
            debug!(version = STORE_SCHEMA_VERSION, "schema version recorded");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
