//! Deterministic collaborators shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::catalog::{
    AuthorDetails, BookCatalog, CatalogError, CatalogQuery, SearchDoc, WorkDetails,
};
use crate::gateway::{GatewayError, ModelGateway};

#[derive(Default)]
pub(crate) struct StubCatalog {
    pub(crate) by_isbn: HashMap<String, SearchDoc>,
    pub(crate) by_title: HashMap<String, SearchDoc>,
    pub(crate) works: HashMap<String, WorkDetails>,
    pub(crate) authors: HashMap<String, AuthorDetails>,
    pub(crate) fail_search: bool,
}

impl BookCatalog for StubCatalog {
    fn search(&self, query: &CatalogQuery, _limit: usize) -> Result<Vec<SearchDoc>, CatalogError> {
        if self.fail_search {
            return Err(CatalogError::Request {
                url: "stub://search".to_string(),
                message: "connection refused".to_string(),
            });
        }

        let hit = match (&query.query, &query.title) {
            (Some(raw), _) => raw
                .strip_prefix("isbn:")
                .and_then(|isbn| self.by_isbn.get(isbn)),
            (None, Some(title)) => self.by_title.get(title),
            (None, None) => None,
        };
        Ok(hit.cloned().into_iter().collect())
    }

    fn work_details(&self, work_key: &str) -> Result<Option<WorkDetails>, CatalogError> {
        Ok(self.works.get(work_key).cloned())
    }

    fn author_details(&self, author_key: &str) -> Result<Option<AuthorDetails>, CatalogError> {
        Ok(self.authors.get(author_key).cloned())
    }
}

/// Gateway that maps known texts to fixed vectors. Unknown texts fail, which
/// mimics an unreachable model server.
#[derive(Default)]
pub(crate) struct StubGateway {
    pub(crate) vectors: Mutex<HashMap<String, Vec<f32>>>,
    pub(crate) explanation: Option<String>,
    pub(crate) embed_calls: AtomicUsize,
    pub(crate) generate_calls: AtomicUsize,
}

impl StubGateway {
    pub(crate) fn with_vectors(pairs: &[(&str, Vec<f32>)]) -> Self {
        let vectors = pairs
            .iter()
            .map(|(text, vector)| (text.to_string(), vector.clone()))
            .collect::<HashMap<String, Vec<f32>>>();
        Self {
            vectors: Mutex::new(vectors),
            ..Default::default()
        }
    }

    /// Texts are matched by their first line, which is the book title in
    /// embedding payloads.
    fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        let vectors = self.vectors.lock().ok()?;
        vectors
            .get(text)
            .or_else(|| vectors.get(text.lines().next().unwrap_or_default()))
            .cloned()
    }
}

impl ModelGateway for StubGateway {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(text).ok_or_else(|| GatewayError::Request {
            url: "stub://embed".to_string(),
            message: format!("no vector for '{text}'"),
        })
    }

    fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, GatewayError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.explanation.clone().ok_or_else(|| GatewayError::Request {
            url: "stub://generate".to_string(),
            message: format!("generation disabled for prompt of {} chars", prompt.len()),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub(crate) fn search_doc(key: Option<&str>, title: &str, authors: &[&str], isbns: &[&str]) -> SearchDoc {
    SearchDoc {
        key: key.map(str::to_string),
        title: Some(title.to_string()),
        author_name: authors.iter().map(|value| value.to_string()).collect(),
        isbn: isbns.iter().map(|value| value.to_string()).collect(),
        cover_i: None,
        subject: Vec::new(),
    }
}
