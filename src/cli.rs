use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use shelfmatch::config::{
    ConfigError, ENV_DB_PATH, ENV_EMBED_MODEL, ENV_ENABLE_EXPLANATIONS, ENV_ENABLED, ENV_LIKED_WEIGHT,
    ENV_LLM_MODEL, ENV_MIN_SIMILARITY, ENV_OLLAMA_URL, ENV_TOP_K, ENV_VECTOR_BACKEND,
};
use shelfmatch::{Rating, RecommenderConfig};

#[derive(Parser, Debug)]
#[command(
    name = "shelfmatch",
    version,
    about = "Content-based book recommendations over a local catalog"
)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Recommend(RecommendArgs),
    Remove(RemoveArgs),
    Feedback(FeedbackArgs),
    Refresh(RefreshArgs),
    Books(BooksArgs),
    Status(StatusArgs),
}

/// Recommender settings. Every flag falls back to its environment
/// variable; values are checked by [`RecommenderConfig::validate`].
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, env = "BOOK_RECOMMENDER_ENABLED", global = true, value_name = "BOOL")]
    pub enabled: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "BOOK_RECOMMENDER_VECTOR_BACKEND", global = true)]
    pub vector_backend: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_EMBED_MODEL", global = true)]
    pub embed_model: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_LLM_MODEL", global = true)]
    pub llm_model: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_OLLAMA_URL", global = true)]
    pub ollama_url: Option<String>,

    #[arg(
        long,
        env = "BOOK_RECOMMENDER_ENABLE_EXPLANATIONS",
        global = true,
        value_name = "BOOL"
    )]
    pub enable_explanations: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_TOP_K", global = true)]
    pub top_k: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_MIN_SIMILARITY", global = true)]
    pub min_similarity: Option<String>,

    #[arg(long, env = "BOOK_RECOMMENDER_LIKED_WEIGHT", global = true)]
    pub liked_weight: Option<String>,
}

impl ConfigArgs {
    pub fn to_config(&self) -> Result<RecommenderConfig, ConfigError> {
        RecommenderConfig::from_lookup(|key| self.value_for(key))
    }

    fn value_for(&self, key: &str) -> Option<String> {
        match key {
            ENV_ENABLED => self.enabled.clone(),
            ENV_DB_PATH => self.db_path.as_ref().map(|path| path.display().to_string()),
            ENV_VECTOR_BACKEND => self.vector_backend.clone(),
            ENV_EMBED_MODEL => self.embed_model.clone(),
            ENV_LLM_MODEL => self.llm_model.clone(),
            ENV_OLLAMA_URL => self.ollama_url.clone(),
            ENV_ENABLE_EXPLANATIONS => self.enable_explanations.clone(),
            ENV_TOP_K => self.top_k.clone(),
            ENV_MIN_SIMILARITY => self.min_similarity.clone(),
            ENV_LIKED_WEIGHT => self.liked_weight.clone(),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["isbn", "title", "work_key"])
))]
pub struct IngestArgs {
    #[arg(long)]
    pub isbn: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, requires = "title")]
    pub author: Option<String>,

    #[arg(long)]
    pub work_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RecommendArgs {
    #[arg(long = "liked", value_name = "BOOK_ID")]
    pub liked: Vec<String>,

    #[arg(long)]
    pub prompt: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    pub book_id: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RatingArg {
    Up,
    Down,
}

impl From<RatingArg> for Rating {
    fn from(value: RatingArg) -> Self {
        match value {
            RatingArg::Up => Rating::Up,
            RatingArg::Down => Rating::Down,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FeedbackArgs {
    pub book_id: String,

    #[arg(long, value_enum)]
    pub rating: RatingArg,

    #[arg(long = "source-book", value_name = "BOOK_ID")]
    pub source_books: Vec<String>,

    #[arg(long)]
    pub source_prompt: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RefreshArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BooksArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
