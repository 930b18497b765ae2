//! Bibliographic lookup collaborator and its Open Library implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use thiserror::Error;

const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "shelfmatch/0.1 (audiobook dashboard)";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("catalog response from {url} could not be parsed: {message}")]
    Parse { url: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub query: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl CatalogQuery {
    pub fn isbn(isbn: &str) -> Self {
        Self {
            query: Some(format!("isbn:{isbn}")),
            ..Default::default()
        }
    }

    pub fn title(title: &str, author: Option<&str>) -> Self {
        Self {
            title: Some(title.to_string()),
            author: author.map(str::to_string),
            ..Default::default()
        }
    }
}

/// One document of a `search.json` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchDoc {
    pub key: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Vec<String>,
    #[serde(default)]
    pub isbn: Vec<String>,
    pub cover_i: Option<i64>,
    #[serde(default)]
    pub subject: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Structured { value: Option<String> },
}

impl Description {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Structured { value } => value.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorKey {
    pub key: String,
}

/// Author entry of a work: either `{"author": {"key": ...}}` or a bare
/// `{"key": ...}` stub. Anything else is kept as `Other` and has no key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AuthorRef {
    Nested { author: AuthorKey },
    Direct(AuthorKey),
    Other(IgnoredAny),
}

impl AuthorRef {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Nested { author } => Some(&author.key),
            Self::Direct(author) => Some(&author.key),
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkDetails {
    pub title: Option<String>,
    pub description: Option<Description>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub authors: Vec<AuthorRef>,
    #[serde(default)]
    pub covers: Vec<i64>,
}

impl WorkDetails {
    pub fn description_text(&self) -> Option<String> {
        self.description
            .as_ref()
            .and_then(Description::text)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthorDetails {
    pub name: Option<String>,
}

pub trait BookCatalog: Send + Sync {
    fn search(&self, query: &CatalogQuery, limit: usize) -> Result<Vec<SearchDoc>, CatalogError>;

    /// `Ok(None)` when the key does not resolve.
    fn work_details(&self, work_key: &str) -> Result<Option<WorkDetails>, CatalogError>;

    fn author_details(&self, author_key: &str) -> Result<Option<AuthorDetails>, CatalogError>;
}

impl<T: BookCatalog + ?Sized> BookCatalog for Arc<T> {
    fn search(&self, query: &CatalogQuery, limit: usize) -> Result<Vec<SearchDoc>, CatalogError> {
        (**self).search(query, limit)
    }

    fn work_details(&self, work_key: &str) -> Result<Option<WorkDetails>, CatalogError> {
        (**self).work_details(work_key)
    }

    fn author_details(&self, author_key: &str) -> Result<Option<AuthorDetails>, CatalogError> {
        (**self).author_details(author_key)
    }
}

pub fn normalize_work_key(work_key: &str) -> String {
    normalize_key(work_key, "/works/")
}

pub fn normalize_author_key(author_key: &str) -> String {
    normalize_key(author_key, "/authors/")
}

fn normalize_key(key: &str, prefix: &str) -> String {
    let trimmed = key.trim();
    if trimmed.starts_with(prefix) {
        trimmed.to_string()
    } else {
        format!("{prefix}{}", trimmed.trim_start_matches('/'))
    }
}

pub struct OpenLibraryCatalog {
    base_url: String,
    agent: ureq::Agent,
}

impl OpenLibraryCatalog {
    pub fn new() -> Self {
        Self::with_base_url(OPEN_LIBRARY_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(CATALOG_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, request: ureq::Request) -> Result<Option<T>, CatalogError> {
        let url = request.url().to_string();
        let response = match request.set("Accept", "application/json").call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => {
                return Err(CatalogError::Request {
                    url,
                    message: err.to_string(),
                });
            }
        };

        response
            .into_json::<T>()
            .map(Some)
            .map_err(|err| CatalogError::Parse {
                url,
                message: err.to_string(),
            })
    }
}

impl Default for OpenLibraryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

impl BookCatalog for OpenLibraryCatalog {
    fn search(&self, query: &CatalogQuery, limit: usize) -> Result<Vec<SearchDoc>, CatalogError> {
        let mut request = self
            .agent
            .get(&format!("{}/search.json", self.base_url))
            .query("limit", &limit.max(1).to_string());

        if let Some(value) = &query.query {
            request = request.query("q", value);
        }
        if let Some(value) = &query.title {
            request = request.query("title", value);
        }
        if let Some(value) = &query.author {
            request = request.query("author", value);
        }

        let response = self.get_json::<SearchResponse>(request)?;
        Ok(response.map(|value| value.docs).unwrap_or_default())
    }

    fn work_details(&self, work_key: &str) -> Result<Option<WorkDetails>, CatalogError> {
        let url = format!("{}{}.json", self.base_url, normalize_work_key(work_key));
        self.get_json(self.agent.get(&url))
    }

    fn author_details(&self, author_key: &str) -> Result<Option<AuthorDetails>, CatalogError> {
        let url = format!("{}{}.json", self.base_url, normalize_author_key(author_key));
        self.get_json(self.agent.get(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_normalized_with_prefix() {
        assert_eq!(normalize_work_key("OL45804W"), "/works/OL45804W");
        assert_eq!(normalize_work_key("/works/OL45804W"), "/works/OL45804W");
        assert_eq!(normalize_author_key("/OL26320A"), "/authors/OL26320A");
    }

    #[test]
    fn work_details_accept_both_description_shapes() {
        let plain: WorkDetails =
            serde_json::from_str(r#"{"title":"Dune","description":"Spice."}"#).expect("plain");
        assert_eq!(plain.description_text().as_deref(), Some("Spice."));

        let structured: WorkDetails = serde_json::from_str(
            r#"{"title":"Dune","description":{"type":"/type/text","value":"Arrakis."}}"#,
        )
        .expect("structured");
        assert_eq!(structured.description_text().as_deref(), Some("Arrakis."));

        let missing: WorkDetails = serde_json::from_str(r#"{"title":"Dune"}"#).expect("missing");
        assert_eq!(missing.description_text(), None);
    }

    #[test]
    fn author_refs_accept_nested_and_direct_stubs() {
        let details: WorkDetails = serde_json::from_str(
            r#"{
              "authors": [
                {"author": {"key": "/authors/OL1A"}, "type": {"key": "/type/author_role"}},
                {"key": "/authors/OL2A"}
              ]
            }"#,
        )
        .expect("authors should parse");

        let keys = details.authors.iter().map(AuthorRef::key).collect::<Vec<Option<&str>>>();
        assert_eq!(keys, vec![Some("/authors/OL1A"), Some("/authors/OL2A")]);
    }

    #[test]
    fn author_entry_without_key_does_not_fail_the_work() {
        let details: WorkDetails = serde_json::from_str(
            r#"{"title":"Dune","authors":[{"author":{"key":"/authors/OL1A"}},{"type":{"key":"/type/author_role"}}]}"#,
        )
        .expect("work should parse");

        assert_eq!(details.title.as_deref(), Some("Dune"));
        let keys = details.authors.iter().map(AuthorRef::key).collect::<Vec<Option<&str>>>();
        assert_eq!(keys, vec![Some("/authors/OL1A"), None]);
    }

    #[test]
    fn search_doc_tolerates_missing_lists() {
        let doc: SearchDoc =
            serde_json::from_str(r#"{"key":"/works/OL1W","title":"Dune"}"#).expect("doc");
        assert!(doc.author_name.is_empty());
        assert!(doc.isbn.is_empty());
        assert_eq!(doc.cover_i, None);
    }
}
