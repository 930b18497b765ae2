//! Resolves ISBNs, titles and work keys to normalized book records.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{BookCatalog, CatalogError, CatalogQuery, SearchDoc, WorkDetails, normalize_work_key};
use crate::model::BookDraft;
use crate::store::{MetadataStore, StoreError};

pub const MAX_SUBJECTS: usize = 50;
pub const MAX_ISBNS: usize = 10;
const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which attribute a book id was taken from, strongest first.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdSource {
    WorkKey,
    Isbn,
    Title,
}

impl IdSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkKey => "work_key",
            Self::Isbn => "isbn",
            Self::Title => "title",
        }
    }
}

/// Picks the book id: work key, else first ISBN, else the title. Titles
/// are a weak identity and two distinct books sharing one will collide.
pub fn derive_book_id(work_key: Option<&str>, isbns: &[String], title: &str) -> (String, IdSource) {
    if let Some(key) = work_key.filter(|value| !value.trim().is_empty()) {
        return (key.trim().to_string(), IdSource::WorkKey);
    }
    if let Some(isbn) = isbns.iter().find(|value| !value.trim().is_empty()) {
        return (isbn.trim().to_string(), IdSource::Isbn);
    }
    (title.to_string(), IdSource::Title)
}

/// Strips separators, keeping digits and the `X` check character.
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|character| character.is_ascii_digit() || matches!(character, 'x' | 'X'))
        .collect::<String>()
        .to_ascii_uppercase()
}

pub struct MetadataIngester<C> {
    store: Arc<MetadataStore>,
    catalog: C,
}

impl<C: BookCatalog> MetadataIngester<C> {
    pub fn new(store: Arc<MetadataStore>, catalog: C) -> Self {
        Self { store, catalog }
    }

    pub fn ingest_by_isbn(&self, isbn: &str) -> Result<Option<String>, IngestError> {
        let normalized = normalize_isbn(isbn);
        let lookup = if normalized.is_empty() { isbn.trim() } else { normalized.as_str() };

        let results = self.catalog.search(&CatalogQuery::isbn(lookup), 1)?;
        let Some(first) = results.into_iter().next() else {
            warn!(isbn = %lookup, "no catalog match for isbn");
            return Ok(None);
        };

        self.ingest_search_doc(first).map(Some)
    }

    pub fn ingest_by_title(&self, title: &str, author: Option<&str>) -> Result<Option<String>, IngestError> {
        let results = self.catalog.search(&CatalogQuery::title(title, author), 1)?;
        let Some(first) = results.into_iter().next() else {
            warn!(title, author = author.unwrap_or_default(), "no catalog match for title");
            return Ok(None);
        };

        self.ingest_search_doc(first).map(Some)
    }

    /// `Ok(None)` when the key does not resolve; lookup failures propagate.
    pub fn ingest_by_work_key(&self, work_key: &str) -> Result<Option<String>, IngestError> {
        let work_key = normalize_work_key(work_key);
        let Some(details) = self.catalog.work_details(&work_key)? else {
            warn!(work_key = %work_key, "no work details for key");
            return Ok(None);
        };

        let authors = self.resolve_authors(&details);
        let draft = BookDraft {
            id: work_key.clone(),
            title: details
                .title
                .clone()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            authors,
            description: details.description_text(),
            subjects: cap(details.subjects.clone(), MAX_SUBJECTS),
            isbns: Vec::new(),
            cover_id: details.covers.first().copied(),
            work_key: Some(work_key),
        };

        self.persist(draft, IdSource::WorkKey).map(Some)
    }

    fn ingest_search_doc(&self, doc: SearchDoc) -> Result<String, IngestError> {
        let title = doc
            .title
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let work_key = doc.key.clone().filter(|value| !value.trim().is_empty());
        let isbns = cap(doc.isbn.clone(), MAX_ISBNS);
        let (book_id, id_source) = derive_book_id(work_key.as_deref(), &isbns, &title);

        let mut description = None;
        let mut subjects = doc.subject.clone();
        if let Some(key) = &work_key {
            match self.catalog.work_details(key) {
                Ok(Some(details)) => {
                    description = details.description_text();
                    if subjects.is_empty() {
                        subjects = details.subjects;
                    }
                }
                Ok(None) => debug!(work_key = %key, "work details missing; keeping search data"),
                Err(err) => warn!(work_key = %key, error = %err, "work details lookup failed; keeping search data"),
            }
        }

        let draft = BookDraft {
            id: book_id,
            title,
            authors: doc.author_name,
            description,
            subjects: cap(subjects, MAX_SUBJECTS),
            isbns,
            cover_id: doc.cover_i,
            work_key,
        };

        self.persist(draft, id_source)
    }

    fn resolve_authors(&self, details: &WorkDetails) -> Vec<String> {
        let mut authors = Vec::<String>::new();
        for author_ref in &details.authors {
            let Some(key) = author_ref.key() else {
                debug!(?author_ref, "author entry without key; skipping");
                continue;
            };
            match self.catalog.author_details(key) {
                Ok(Some(author)) => authors.push(
                    author
                        .name
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                ),
                Ok(None) => debug!(author_key = key, "author not found"),
                Err(err) => warn!(author_key = key, error = %err, "author lookup failed"),
            }
        }
        authors
    }

    fn persist(&self, draft: BookDraft, id_source: IdSource) -> Result<String, IngestError> {
        if id_source == IdSource::Title {
            if let Some(existing) = self.store.get_book(&draft.id)? {
                if existing.authors != draft.authors {
                    warn!(
                        book_id = %draft.id,
                        existing_authors = ?existing.authors,
                        incoming_authors = ?draft.authors,
                        "title-derived id overwrites a book by different authors"
                    );
                }
            }
        }

        let stored = self.store.upsert_book(&draft)?;
        info!(
            book_id = %stored.id,
            id_source = id_source.as_str(),
            subjects = stored.subjects.len(),
            "book ingested"
        );
        Ok(stored.id)
    }
}

fn cap(mut values: Vec<String>, limit: usize) -> Vec<String> {
    values.truncate(limit);
    values
}

#[cfg(test)]
mod tests;
