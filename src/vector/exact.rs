use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{IndexError, VectorIndex, normalized_query, normalized_rows, select_top};
use crate::semantic::dot;

#[derive(Debug, Default)]
struct Snapshot {
    ids: Vec<String>,
    rows: Vec<Vec<f32>>,
    dims: usize,
}

/// Brute-force scan over every row. Searches see either the previous or
/// the new snapshot, never a partial build.
#[derive(Debug, Default)]
pub struct ExactIndex {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl ExactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl VectorIndex for ExactIndex {
    fn build(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let (dims, rows) = normalized_rows(ids, vectors)?;
        let next = Arc::new(Snapshot {
            ids: ids.to_vec(),
            rows,
            dims,
        });

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(rows = ids.len(), dims, "exact index built");
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        let snapshot = self.current();
        if top_k == 0 || snapshot.rows.is_empty() {
            return Vec::new();
        }
        let Some(query) = normalized_query(query, snapshot.dims) else {
            return Vec::new();
        };

        let scores = snapshot
            .rows
            .iter()
            .map(|row| dot(row, &query))
            .collect::<Vec<f32>>();
        select_top(&snapshot.ids, &scores, top_k)
    }
}
