//! Content-based book recommendations over a locally stored catalog.
//!
//! Books are pulled from a bibliographic catalog, embedded through a
//! model-serving gateway and ranked by cosine similarity to the books a
//! reader liked and/or a free-text prompt. [`Recommender`] is the entry
//! point; everything else is exposed for composition and testing.

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod model;
pub mod recommender;
pub mod semantic;
pub mod store;
pub mod util;
pub mod vector;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{RecommenderConfig, Settings};
pub use error::RecommenderError;
pub use model::{Book, Rating, Recommendation};
pub use recommender::{IngestRequest, Lifecycle, Recommender};
