//! Cosine nearest-neighbor search over a batch-built set of book vectors.
//!
//! Both backends L2-normalize the indexed rows at build time and the query
//! at search time, then rank by inner product. A zero-norm query has no
//! direction and yields no results. Indexed zero vectors stay zero and
//! score 0 against every query.

mod exact;
#[cfg(feature = "flat-index")]
mod flat;

use std::cmp::Ordering;

use thiserror::Error;
use tracing::{info, warn};

use crate::semantic::normalize_vector;

pub use exact::ExactIndex;
#[cfg(feature = "flat-index")]
pub use flat::FlatIndex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("index build got {ids} ids but {vectors} vectors")]
    LengthMismatch { ids: usize, vectors: usize },

    #[error("vector for '{book_id}' has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        book_id: String,
        expected: usize,
        found: usize,
    },

    #[error("vector for '{book_id}' is empty")]
    EmptyVector { book_id: String },

    #[error("failed to shape index matrix: {0}")]
    Shape(String),
}

/// Backend requested through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Exact,
    Optimized,
}

impl BackendKind {
    /// Accepts the canonical names plus the legacy `python` / `faiss`
    /// spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" | "python" => Some(Self::Exact),
            "optimized" | "faiss" => Some(Self::Optimized),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Optimized => "optimized",
        }
    }
}

pub trait VectorIndex: Send + Sync {
    /// Replaces the whole index. `ids[i]` labels `vectors[i]`.
    fn build(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), IndexError>;

    /// Up to `top_k` `(id, score)` pairs, best first.
    fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)>;
}

/// Backend chosen at startup.
pub enum IndexBackend {
    Exact(ExactIndex),
    #[cfg(feature = "flat-index")]
    Optimized(FlatIndex),
}

impl IndexBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Exact(_) => BackendKind::Exact,
            #[cfg(feature = "flat-index")]
            Self::Optimized(_) => BackendKind::Optimized,
        }
    }
}

impl VectorIndex for IndexBackend {
    fn build(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        match self {
            Self::Exact(index) => index.build(ids, vectors),
            #[cfg(feature = "flat-index")]
            Self::Optimized(index) => index.build(ids, vectors),
        }
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        match self {
            Self::Exact(index) => index.search(query, top_k),
            #[cfg(feature = "flat-index")]
            Self::Optimized(index) => index.search(query, top_k),
        }
    }
}

pub fn optimized_backend_available() -> bool {
    cfg!(feature = "flat-index")
}

/// Builds the requested backend, falling back to the exact one when the
/// optimized backend was not compiled in. Call once per process.
pub fn create_index(requested: BackendKind) -> IndexBackend {
    match requested {
        BackendKind::Exact => {
            info!(backend = "exact", "vector index backend selected");
            IndexBackend::Exact(ExactIndex::new())
        }
        BackendKind::Optimized => create_optimized(),
    }
}

#[cfg(feature = "flat-index")]
fn create_optimized() -> IndexBackend {
    info!(backend = "optimized", "vector index backend selected");
    IndexBackend::Optimized(FlatIndex::new())
}

#[cfg(not(feature = "flat-index"))]
fn create_optimized() -> IndexBackend {
    warn!(
        requested = "optimized",
        backend = "exact",
        "optimized vector index not compiled in (feature flat-index); falling back to exact"
    );
    IndexBackend::Exact(ExactIndex::new())
}

/// Checks alignment and dimensions, then returns unit-normalized rows and
/// their common dimension.
pub(crate) fn normalized_rows(
    ids: &[String],
    vectors: &[Vec<f32>],
) -> Result<(usize, Vec<Vec<f32>>), IndexError> {
    if ids.len() != vectors.len() {
        return Err(IndexError::LengthMismatch {
            ids: ids.len(),
            vectors: vectors.len(),
        });
    }

    let Some(first) = vectors.first() else {
        return Ok((0, Vec::new()));
    };
    let dims = first.len();

    let mut rows = Vec::<Vec<f32>>::with_capacity(vectors.len());
    for (book_id, vector) in ids.iter().zip(vectors.iter()) {
        if vector.is_empty() {
            return Err(IndexError::EmptyVector {
                book_id: book_id.clone(),
            });
        }
        if vector.len() != dims {
            return Err(IndexError::DimensionMismatch {
                book_id: book_id.clone(),
                expected: dims,
                found: vector.len(),
            });
        }

        let mut row = vector.clone();
        normalize_vector(&mut row);
        rows.push(row);
    }

    Ok((dims, rows))
}

/// Normalized copy of `query`, or `None` when it cannot be compared
/// against rows of `dims` dimensions.
pub(crate) fn normalized_query(query: &[f32], dims: usize) -> Option<Vec<f32>> {
    if dims == 0 || query.len() != dims {
        if dims != 0 {
            warn!(expected = dims, found = query.len(), "query dimension mismatch");
        }
        return None;
    }

    let mut normalized = query.to_vec();
    normalize_vector(&mut normalized).then_some(normalized)
}

/// Sorts scores descending and keeps the best `top_k`. Ties keep build
/// order.
pub(crate) fn select_top(ids: &[String], scores: &[f32], top_k: usize) -> Vec<(String, f32)> {
    let mut order = (0..scores.len()).collect::<Vec<usize>>();
    order.sort_by(|left, right| {
        scores[*right]
            .partial_cmp(&scores[*left])
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.cmp(right))
    });

    order
        .into_iter()
        .take(top_k.min(scores.len()))
        .map(|position| (ids[position].clone(), scores[position]))
        .collect()
}
