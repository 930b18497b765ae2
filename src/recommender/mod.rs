//! The recommendation orchestrator: the one entry point callers use.
//!
//! A [`Recommender`] is cheap to construct. Configuration is validated and
//! the store, gateway, catalog and vector index are built on first use,
//! exactly once, even under concurrent first calls. The outcome of that
//! step ([`Lifecycle`]) is fixed for the life of the value; only
//! [`Recommender::reset`] starts over.

mod explain;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::{BookCatalog, OpenLibraryCatalog};
use crate::config::{ConfigError, ENV_DB_PATH, RecommenderConfig, Settings};
use crate::error::RecommenderError;
use crate::gateway::{ModelGateway, OllamaGateway};
use crate::ingest::MetadataIngester;
use crate::model::{Book, Rating, Recommendation};
use crate::semantic::{embedding_payload, index_freshness_hash, mean_vector, round_score, weighted_merge};
use crate::store::MetadataStore;
use crate::vector::{IndexBackend, VectorIndex, create_index};

use self::explain::{ExplanationSource, explain};

/// Identifies the book to ingest. When several keys are set the work key
/// wins, then the ISBN, then the title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestRequest {
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub work_key: Option<String>,
}

impl IngestRequest {
    pub fn isbn(isbn: impl Into<String>) -> Self {
        Self {
            isbn: Some(isbn.into()),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>, author: Option<&str>) -> Self {
        Self {
            title: Some(title.into()),
            author: author.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn work_key(work_key: impl Into<String>) -> Self {
        Self {
            work_key: Some(work_key.into()),
            ..Default::default()
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninitialized,
    Disabled,
    ConfigError,
    Ready,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Disabled => "disabled",
            Self::ConfigError => "config_error",
            Self::Ready => "ready",
        }
    }
}

/// External services the recommender talks to.
pub struct Collaborators {
    pub gateway: Arc<dyn ModelGateway>,
    pub catalog: Arc<dyn BookCatalog>,
}

type ConnectFn = dyn Fn(&Settings) -> Collaborators + Send + Sync;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub stale: usize,
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub lifecycle: Lifecycle,
    pub detail: Option<String>,
    pub backend: Option<&'static str>,
    pub embed_model: Option<String>,
    pub books: i64,
    pub embeddings: i64,
    pub stale_books: usize,
    pub feedback: i64,
    pub index_marker: Option<String>,
    pub gateway_reachable: Option<bool>,
}

impl StatusReport {
    fn inactive(lifecycle: Lifecycle, detail: Option<String>) -> Self {
        Self {
            lifecycle,
            detail,
            backend: None,
            embed_model: None,
            books: 0,
            embeddings: 0,
            stale_books: 0,
            feedback: 0,
            index_marker: None,
            gateway_reachable: None,
        }
    }
}

enum State {
    Disabled,
    Failed(ConfigError),
    Ready(Box<Engine>),
}

struct Engine {
    settings: Settings,
    store: Arc<MetadataStore>,
    gateway: Arc<dyn ModelGateway>,
    ingester: MetadataIngester<Arc<dyn BookCatalog>>,
    index: IndexBackend,
    /// Freshness marker of what `index` currently holds. `None` until the
    /// first build in this process.
    loaded_marker: Mutex<Option<String>>,
}

pub struct Recommender {
    config: RecommenderConfig,
    connect: Box<ConnectFn>,
    state: OnceLock<State>,
}

impl Recommender {
    /// Uses the Ollama gateway and the Open Library catalog.
    pub fn new(config: RecommenderConfig) -> Self {
        Self::with_collaborators(config, |settings: &Settings| Collaborators {
            gateway: Arc::new(OllamaGateway::new(
                &settings.ollama_url,
                &settings.embed_model,
                &settings.llm_model,
            )),
            catalog: Arc::new(OpenLibraryCatalog::new()),
        })
    }

    /// `connect` runs once, after configuration validated.
    pub fn with_collaborators<F>(config: RecommenderConfig, connect: F) -> Self
    where
        F: Fn(&Settings) -> Collaborators + Send + Sync + 'static,
    {
        Self {
            config,
            connect: Box::new(connect),
            state: OnceLock::new(),
        }
    }

    /// Drops all initialized state and swaps in a new configuration.
    pub fn reset(&mut self, config: RecommenderConfig) {
        self.config = config;
        self.state = OnceLock::new();
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.state.get() {
            None => Lifecycle::Uninitialized,
            Some(State::Disabled) => Lifecycle::Disabled,
            Some(State::Failed(_)) => Lifecycle::ConfigError,
            Some(State::Ready(_)) => Lifecycle::Ready,
        }
    }

    /// Runs initialization if it has not happened yet.
    pub fn initialize(&self) -> Lifecycle {
        self.state();
        self.lifecycle()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn state(&self) -> &State {
        self.state.get_or_init(|| self.build_state())
    }

    fn build_state(&self) -> State {
        if !self.config.enabled {
            info!("book recommender disabled");
            return State::Disabled;
        }

        let settings = match self.config.validate() {
            Ok(settings) => settings,
            Err(err) => {
                error!(error = %err, "book recommender configuration invalid");
                return State::Failed(err);
            }
        };

        let store = match MetadataStore::open(&settings.db_path) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                error!(db_path = %settings.db_path.display(), error = %err, "failed to open book database");
                return State::Failed(ConfigError::Invalid {
                    field: "db_path",
                    env: ENV_DB_PATH,
                    value: settings.db_path.display().to_string(),
                    reason: err.to_string(),
                });
            }
        };

        let Collaborators { gateway, catalog } = (self.connect)(&settings);
        let index = create_index(settings.vector_backend);
        info!(
            db_path = %settings.db_path.display(),
            backend = index.kind().as_str(),
            embed_model = %settings.embed_model,
            llm_model = %settings.llm_model,
            explanations = settings.enable_explanations,
            "book recommender ready"
        );

        State::Ready(Box::new(Engine {
            ingester: MetadataIngester::new(Arc::clone(&store), catalog),
            settings,
            store,
            gateway,
            index,
            loaded_marker: Mutex::new(None),
        }))
    }

    fn engine(&self) -> Result<&Engine, RecommenderError> {
        match self.state() {
            State::Disabled => Err(RecommenderError::Disabled),
            State::Failed(err) => Err(RecommenderError::Config(err.clone())),
            State::Ready(engine) => Ok(&**engine),
        }
    }

    /// Adds or updates a book, then embeds every stale book.
    ///
    /// `Ok(None)` means the catalog had no match. Catalog failures are
    /// [`RecommenderError::Upstream`].
    pub fn ingest(&self, request: &IngestRequest) -> Result<Option<String>, RecommenderError> {
        let engine = self.engine()?;
        info!(
            isbn = request.isbn.as_deref().unwrap_or_default(),
            title = request.title.as_deref().unwrap_or_default(),
            author = request.author.as_deref().unwrap_or_default(),
            work_key = request.work_key.as_deref().unwrap_or_default(),
            "ingest called"
        );

        let present = |value: &Option<String>| value.clone().filter(|inner| !inner.trim().is_empty());
        let book_id = if let Some(work_key) = present(&request.work_key) {
            engine.ingester.ingest_by_work_key(&work_key)?
        } else if let Some(isbn) = present(&request.isbn) {
            engine.ingester.ingest_by_isbn(&isbn)?
        } else if let Some(title) = present(&request.title) {
            let author = present(&request.author);
            engine.ingester.ingest_by_title(&title, author.as_deref())?
        } else {
            warn!("ingest called without isbn, title or work key");
            None
        };

        if book_id.is_some() {
            if let Err(err) = engine.embed_stale_books() {
                warn!(error = %err, "embedding refresh after ingest failed");
            }
        }
        Ok(book_id)
    }

    /// The index is rebuilt lazily on the next [`Recommender::recommend`].
    pub fn remove_book(&self, book_id: &str) -> Result<bool, RecommenderError> {
        let engine = self.engine()?;
        let removed = engine.store.delete_book(book_id)?;
        info!(book_id, removed, "remove_book called");
        Ok(removed)
    }

    /// Ranked books similar to the liked books and/or the prompt.
    ///
    /// Returns an empty list when the recommender is disabled or nothing
    /// usable was given.
    pub fn recommend(
        &self,
        liked_book_ids: &[String],
        prompt: Option<&str>,
    ) -> Result<Vec<Recommendation>, RecommenderError> {
        let engine = match self.engine() {
            Err(RecommenderError::Disabled) => return Ok(Vec::new()),
            other => other?,
        };

        let prompt = prompt.map(str::trim).filter(|value| !value.is_empty());
        if liked_book_ids.is_empty() && prompt.is_none() {
            return Ok(Vec::new());
        }
        info!(
            liked = liked_book_ids.len(),
            prompt_chars = prompt.map_or(0, str::len),
            "recommend called"
        );

        engine.refresh_index()?;

        let Some(query) = engine.query_vector(liked_book_ids, prompt)? else {
            info!("no usable query vector; returning no recommendations");
            return Ok(Vec::new());
        };

        let settings = &engine.settings;
        let candidates = engine
            .index
            .search(&query, settings.top_k + liked_book_ids.len());
        let excluded = liked_book_ids
            .iter()
            .map(String::as_str)
            .collect::<HashSet<&str>>();
        // Threshold applies to the reported (rounded) score.
        let min_similarity = f64::from(settings.min_similarity);
        let survivors = candidates
            .iter()
            .filter(|(book_id, _)| !excluded.contains(book_id.as_str()))
            .map(|(book_id, score)| (book_id, round_score(*score)))
            .filter(|(_, score)| *score >= min_similarity)
            .take(settings.top_k)
            .collect::<Vec<(&String, f64)>>();

        let liked_books = if settings.enable_explanations {
            liked_book_ids
                .iter()
                .filter_map(|book_id| engine.store.get_book(book_id).transpose())
                .collect::<Result<Vec<Book>, _>>()?
        } else {
            Vec::new()
        };
        let source = ExplanationSource::pick(&liked_books, prompt);

        let mut out = Vec::<Recommendation>::with_capacity(survivors.len());
        for (book_id, score) in survivors {
            let Some(book) = engine.store.get_book(book_id)? else {
                debug!(book_id = %book_id, "indexed book no longer stored; skipping");
                continue;
            };

            let explanation = match (&source, settings.enable_explanations) {
                (Some(source), true) => explain(engine.gateway.as_ref(), source, &book),
                _ => None,
            };

            out.push(Recommendation {
                book_id: book.id,
                title: book.title,
                authors: book.authors,
                description: book.description,
                subjects: book.subjects,
                cover_id: book.cover_id,
                work_key: book.work_key,
                score,
                explanation,
            });
        }

        info!(
            results = out.len(),
            candidates = candidates.len(),
            "recommend finished"
        );
        Ok(out)
    }

    /// Records a thumbs up or down. Storage failures are logged, not
    /// returned.
    pub fn submit_feedback(
        &self,
        book_id: &str,
        rating: Rating,
        source_book_ids: &[String],
        source_prompt: Option<&str>,
    ) -> Result<(), RecommenderError> {
        let engine = self.engine()?;
        let source_prompt = source_prompt.filter(|value| !value.trim().is_empty());

        match engine
            .store
            .append_feedback(book_id, rating, source_book_ids, source_prompt)
        {
            Ok(feedback_id) => info!(feedback_id, book_id, rating = rating.as_i64(), "feedback recorded"),
            Err(err) => warn!(book_id, rating = rating.as_i64(), error = %err, "feedback was not stored"),
        }
        Ok(())
    }

    /// Embeds every book whose embedding is missing or outdated.
    pub fn refresh_embeddings(&self) -> Result<RefreshSummary, RecommenderError> {
        self.engine()?.embed_stale_books()
    }

    pub fn list_books(&self) -> Result<Vec<Book>, RecommenderError> {
        Ok(self.engine()?.store.list_books()?)
    }

    /// Diagnostics. Never fails for a disabled or misconfigured recommender.
    pub fn status(&self) -> Result<StatusReport, RecommenderError> {
        let engine = match self.state() {
            State::Disabled => return Ok(StatusReport::inactive(Lifecycle::Disabled, None)),
            State::Failed(err) => {
                return Ok(StatusReport::inactive(
                    Lifecycle::ConfigError,
                    Some(err.to_string()),
                ));
            }
            State::Ready(engine) => engine,
        };

        let counts = engine.store.counts()?;
        let stale_books = engine
            .store
            .find_stale_books(&engine.settings.embed_model)?
            .len();

        Ok(StatusReport {
            lifecycle: Lifecycle::Ready,
            detail: None,
            backend: Some(engine.index.kind().as_str()),
            embed_model: Some(engine.settings.embed_model.clone()),
            books: counts.books,
            embeddings: counts.embeddings,
            stale_books,
            feedback: counts.feedback,
            index_marker: engine.store.freshness_marker()?,
            gateway_reachable: Some(engine.gateway.is_available()),
        })
    }
}

impl Engine {
    /// One failing book is logged and skipped; the rest still embed.
    fn embed_stale_books(&self) -> Result<RefreshSummary, RecommenderError> {
        let model_id = self.settings.embed_model.as_str();
        let stale = self.store.find_stale_books(model_id)?;
        let mut summary = RefreshSummary {
            stale: stale.len(),
            ..Default::default()
        };
        if stale.is_empty() {
            return Ok(summary);
        }

        for book in &stale {
            let payload = embedding_payload(&book.title, book.description.as_deref(), &book.subjects);
            let vector = match self.gateway.embed(&payload) {
                Ok(vector) if !vector.is_empty() => vector,
                Ok(_) => {
                    warn!(book_id = %book.id, "embedding came back empty; skipping");
                    summary.failed += 1;
                    continue;
                }
                Err(err) => {
                    warn!(book_id = %book.id, error = %err, "embedding failed; skipping");
                    summary.failed += 1;
                    continue;
                }
            };

            match self
                .store
                .upsert_embedding(&book.id, &vector, model_id, &book.content_hash)
            {
                Ok(()) => summary.embedded += 1,
                Err(err) => {
                    warn!(book_id = %book.id, error = %err, "failed to store embedding; skipping");
                    summary.failed += 1;
                }
            }
        }

        info!(
            stale = summary.stale,
            embedded = summary.embedded,
            failed = summary.failed,
            "embedding refresh finished"
        );
        Ok(summary)
    }

    /// Rebuilds the index when the fresh-embedding set differs from what
    /// the stored marker or the in-memory index reflect.
    fn refresh_index(&self) -> Result<(), RecommenderError> {
        let mut loaded = self
            .loaded_marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let fresh = self.store.list_fresh_embeddings(&self.settings.embed_model)?;
        let marker = index_freshness_hash(fresh.iter().map(|entry| {
            (
                entry.book_id.as_str(),
                entry.model_id.as_str(),
                entry.content_hash.as_str(),
            )
        }));

        let stored = self.store.freshness_marker()?;
        if stored.as_deref() == Some(marker.as_str()) && loaded.as_deref() == Some(marker.as_str()) {
            return Ok(());
        }

        let (ids, vectors): (Vec<String>, Vec<Vec<f32>>) = fresh
            .into_iter()
            .map(|entry| (entry.book_id, entry.vector))
            .unzip();
        self.index.build(&ids, &vectors)?;
        self.store.set_freshness_marker(&marker)?;
        info!(
            vectors = ids.len(),
            backend = self.index.kind().as_str(),
            "vector index rebuilt"
        );
        *loaded = Some(marker);
        Ok(())
    }

    fn query_vector(
        &self,
        liked_book_ids: &[String],
        prompt: Option<&str>,
    ) -> Result<Option<Vec<f32>>, RecommenderError> {
        let mut liked_vectors = Vec::<Vec<f32>>::new();
        for book_id in liked_book_ids {
            match self.store.get_embedding(book_id)? {
                Some(vector) => liked_vectors.push(vector),
                None => debug!(book_id = %book_id, "liked book has no embedding; skipping"),
            }
        }
        let liked = mean_vector(&liked_vectors);
        if liked.is_none() && !liked_vectors.is_empty() {
            warn!("liked book embeddings have mixed dimensions; ignoring them");
        }

        let prompted = match prompt {
            Some(text) => match self.gateway.embed(text) {
                Ok(vector) if !vector.is_empty() => Some(vector),
                Ok(_) => None,
                Err(err) => {
                    warn!(error = %err, "prompt embedding failed");
                    None
                }
            },
            None => None,
        };

        let query = match (liked, prompted) {
            (Some(liked), Some(prompted)) => {
                let merged = weighted_merge(&liked, &prompted, self.settings.liked_weight);
                if merged.is_none() {
                    warn!(
                        liked_dims = liked.len(),
                        prompt_dims = prompted.len(),
                        "liked and prompt vectors differ in dimension"
                    );
                }
                merged
            }
            (Some(liked), None) => Some(liked),
            (None, Some(prompted)) => Some(prompted),
            (None, None) => None,
        };
        Ok(query)
    }
}
