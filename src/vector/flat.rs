use std::sync::{Arc, PoisonError, RwLock};

use ndarray::{Array1, Array2};
use tracing::debug;

use super::{IndexError, VectorIndex, normalized_query, normalized_rows, select_top};

#[derive(Debug)]
struct Matrix {
    ids: Vec<String>,
    rows: Array2<f32>,
}

/// Row-major matrix of unit vectors scored with a single matrix-vector
/// product per query.
#[derive(Debug, Default)]
pub struct FlatIndex {
    matrix: RwLock<Option<Arc<Matrix>>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<Arc<Matrix>> {
        self.matrix
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }
}

impl VectorIndex for FlatIndex {
    fn build(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let (dims, rows) = normalized_rows(ids, vectors)?;

        let next = if rows.is_empty() {
            None
        } else {
            let flat = rows.into_iter().flatten().collect::<Vec<f32>>();
            let rows = Array2::from_shape_vec((ids.len(), dims), flat)
                .map_err(|err| IndexError::Shape(err.to_string()))?;
            Some(Arc::new(Matrix {
                ids: ids.to_vec(),
                rows,
            }))
        };

        *self.matrix.write().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(rows = ids.len(), dims, "flat index built");
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        let Some(matrix) = self.current() else {
            return Vec::new();
        };
        if top_k == 0 {
            return Vec::new();
        }
        let Some(query) = normalized_query(query, matrix.rows.ncols()) else {
            return Vec::new();
        };

        let scores = matrix.rows.dot(&Array1::from_vec(query));
        select_top(&matrix.ids, &scores.to_vec(), top_k)
    }
}
