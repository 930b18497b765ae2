use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::store::StoreError;
use crate::vector::IndexError;

/// Errors surfaced by [`crate::Recommender`].
///
/// "Disabled", "nothing found" (`Ok(None)` / empty results) and
/// [`RecommenderError::Upstream`] are kept apart so callers can tell them
/// to the user differently.
#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("book recommender is disabled; set BOOK_RECOMMENDER_ENABLED=true to enable")]
    Disabled,

    #[error("book recommender configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("upstream service unavailable: {0}")]
    Upstream(String),

    #[error("stored data is malformed: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for RecommenderError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::CorruptEmbedding { book_id } => {
                Self::DataIntegrity(format!("embedding blob for '{book_id}' is not an f32 array"))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<CatalogError> for RecommenderError {
    fn from(error: CatalogError) -> Self {
        Self::Upstream(error.to_string())
    }
}

impl From<IngestError> for RecommenderError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Catalog(err) => err.into(),
            IngestError::Store(err) => err.into(),
        }
    }
}

impl From<IndexError> for RecommenderError {
    fn from(error: IndexError) -> Self {
        Self::DataIntegrity(error.to_string())
    }
}
