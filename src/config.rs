use std::path::PathBuf;

use thiserror::Error;

use crate::vector::BackendKind;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.2;

/// Share of the liked-books signal when it is merged with a free-text
/// prompt. The prompt gets the remainder. Tuned by hand; override with
/// `BOOK_RECOMMENDER_LIKED_WEIGHT`.
pub const DEFAULT_LIKED_WEIGHT: f32 = 0.6;

pub const ENV_ENABLED: &str = "BOOK_RECOMMENDER_ENABLED";
pub const ENV_DB_PATH: &str = "BOOK_RECOMMENDER_DB_PATH";
pub const ENV_VECTOR_BACKEND: &str = "BOOK_RECOMMENDER_VECTOR_BACKEND";
pub const ENV_EMBED_MODEL: &str = "BOOK_RECOMMENDER_EMBED_MODEL";
pub const ENV_LLM_MODEL: &str = "BOOK_RECOMMENDER_LLM_MODEL";
pub const ENV_OLLAMA_URL: &str = "BOOK_RECOMMENDER_OLLAMA_URL";
pub const ENV_ENABLE_EXPLANATIONS: &str = "BOOK_RECOMMENDER_ENABLE_EXPLANATIONS";
pub const ENV_TOP_K: &str = "BOOK_RECOMMENDER_TOP_K";
pub const ENV_MIN_SIMILARITY: &str = "BOOK_RECOMMENDER_MIN_SIMILARITY";
pub const ENV_LIKED_WEIGHT: &str = "BOOK_RECOMMENDER_LIKED_WEIGHT";
pub const ENV_LOG_LEVEL: &str = "BOOK_RECOMMENDER_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{env} is required")]
    Missing { field: &'static str, env: &'static str },

    #[error("{env} has invalid value '{value}': {reason}")]
    Invalid {
        field: &'static str,
        env: &'static str,
        value: String,
        reason: String,
    },
}

/// Raw configuration as read from the environment or the command line.
/// Nothing here is checked until [`RecommenderConfig::validate`].
#[derive(Debug, Clone, Default)]
pub struct RecommenderConfig {
    pub enabled: bool,
    pub db_path: Option<PathBuf>,
    pub vector_backend: Option<String>,
    pub embed_model: Option<String>,
    pub llm_model: Option<String>,
    pub ollama_url: Option<String>,
    pub enable_explanations: bool,
    pub top_k: Option<usize>,
    pub min_similarity: Option<f32>,
    pub liked_weight: Option<f32>,
}

/// Configuration that passed validation. Only this form reaches the
/// components.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub vector_backend: BackendKind,
    pub embed_model: String,
    pub llm_model: String,
    pub ollama_url: String,
    pub enable_explanations: bool,
    pub top_k: usize,
    pub min_similarity: f32,
    pub liked_weight: f32,
}

impl RecommenderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the raw configuration from a key lookup. Unset features are
    /// not parsed at all when the feature flag is off.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = parse_flag(lookup(ENV_ENABLED));
        if !enabled {
            return Ok(Self::default());
        }

        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            enabled,
            db_path: non_empty(ENV_DB_PATH).map(PathBuf::from),
            vector_backend: non_empty(ENV_VECTOR_BACKEND),
            embed_model: non_empty(ENV_EMBED_MODEL),
            llm_model: non_empty(ENV_LLM_MODEL),
            ollama_url: non_empty(ENV_OLLAMA_URL),
            enable_explanations: parse_flag(lookup(ENV_ENABLE_EXPLANATIONS)),
            top_k: parse_number(non_empty(ENV_TOP_K), "top_k", ENV_TOP_K)?,
            min_similarity: parse_number(
                non_empty(ENV_MIN_SIMILARITY),
                "min_similarity",
                ENV_MIN_SIMILARITY,
            )?,
            liked_weight: parse_number(non_empty(ENV_LIKED_WEIGHT), "liked_weight", ENV_LIKED_WEIGHT)?,
        })
    }

    /// Checks every required field in a fixed order and reports the first
    /// problem found.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let db_path = self
            .db_path
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::Missing {
                field: "db_path",
                env: ENV_DB_PATH,
            })?;

        let backend_raw = required(&self.vector_backend, "vector_backend", ENV_VECTOR_BACKEND)?;
        let vector_backend =
            BackendKind::parse(&backend_raw).ok_or_else(|| ConfigError::Invalid {
                field: "vector_backend",
                env: ENV_VECTOR_BACKEND,
                value: backend_raw.clone(),
                reason: "expected one of exact, optimized (aliases: python, faiss)".to_string(),
            })?;

        let embed_model = required(&self.embed_model, "embed_model", ENV_EMBED_MODEL)?;
        let llm_model = required(&self.llm_model, "llm_model", ENV_LLM_MODEL)?;
        let ollama_url = required(&self.ollama_url, "ollama_url", ENV_OLLAMA_URL)?;
        if !(ollama_url.starts_with("http://") || ollama_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "ollama_url",
                env: ENV_OLLAMA_URL,
                value: ollama_url,
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }

        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "top_k",
                env: ENV_TOP_K,
                value: top_k.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let min_similarity = self.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);
        if !(-1.0..=1.0).contains(&min_similarity) {
            return Err(ConfigError::Invalid {
                field: "min_similarity",
                env: ENV_MIN_SIMILARITY,
                value: min_similarity.to_string(),
                reason: "must lie in [-1, 1]".to_string(),
            });
        }

        let liked_weight = self.liked_weight.unwrap_or(DEFAULT_LIKED_WEIGHT);
        if !(0.0..=1.0).contains(&liked_weight) {
            return Err(ConfigError::Invalid {
                field: "liked_weight",
                env: ENV_LIKED_WEIGHT,
                value: liked_weight.to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }

        Ok(Settings {
            db_path,
            vector_backend,
            embed_model,
            llm_model,
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            enable_explanations: self.enable_explanations,
            top_k,
            min_similarity,
            liked_weight,
        })
    }
}

fn required(
    value: &Option<String>,
    field: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::Missing { field, env })
}

/// Turns a `BOOK_RECOMMENDER_LOG_LEVEL` value into a tracing filter
/// directive. Python-style names (`WARNING`, `CRITICAL`) are accepted.
pub fn log_directive(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

fn parse_flag(raw: Option<String>) -> bool {
    raw.map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_number<T>(
    raw: Option<String>,
    field: &'static str,
    env: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|err| ConfigError::Invalid {
            field,
            env,
            value: raw.clone(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<String, String>>();
        move |key: &str| map.get(key).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ENABLED, "TRUE"),
            (ENV_DB_PATH, "/tmp/books.sqlite"),
            (ENV_VECTOR_BACKEND, "faiss"),
            (ENV_EMBED_MODEL, "nomic-embed-text"),
            (ENV_LLM_MODEL, "llama3.2"),
            (ENV_OLLAMA_URL, "http://localhost:11434/"),
        ]
    }

    #[test]
    fn disabled_config_skips_parsing() {
        let config = RecommenderConfig::from_lookup(lookup_from(&[(ENV_TOP_K, "not-a-number")]))
            .expect("disabled config should not parse other fields");
        assert!(!config.enabled);
    }

    #[test]
    fn complete_env_validates_with_defaults() {
        let config =
            RecommenderConfig::from_lookup(lookup_from(&complete_env())).expect("should parse");
        let settings = config.validate().expect("should validate");
        assert_eq!(settings.vector_backend, BackendKind::Optimized);
        assert_eq!(settings.ollama_url, "http://localhost:11434");
        assert_eq!(settings.top_k, DEFAULT_TOP_K);
        assert_eq!(settings.min_similarity, DEFAULT_MIN_SIMILARITY);
        assert_eq!(settings.liked_weight, DEFAULT_LIKED_WEIGHT);
        assert!(!settings.enable_explanations);
    }

    #[test]
    fn validate_reports_first_missing_field() {
        let config = RecommenderConfig {
            enabled: true,
            db_path: Some(PathBuf::from("books.sqlite")),
            vector_backend: Some("exact".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing {
                field: "embed_model",
                env: ENV_EMBED_MODEL,
            })
        );
    }

    #[test]
    fn validate_rejects_unknown_backend() {
        let mut env = complete_env();
        env.retain(|(key, _)| *key != ENV_VECTOR_BACKEND);
        env.push((ENV_VECTOR_BACKEND, "annoy"));
        let config = RecommenderConfig::from_lookup(lookup_from(&env)).expect("should parse");
        let err = config.validate().expect_err("annoy is not a backend");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "vector_backend",
                ..
            }
        ));
    }

    #[test]
    fn malformed_number_is_reported_with_env_name() {
        let mut env = complete_env();
        env.push((ENV_MIN_SIMILARITY, "high"));
        let err = RecommenderConfig::from_lookup(lookup_from(&env)).expect_err("not a float");
        assert!(err.to_string().contains(ENV_MIN_SIMILARITY));
    }

    #[test]
    fn validate_rejects_zero_top_k() {
        let mut env = complete_env();
        env.push((ENV_TOP_K, "0"));
        let config = RecommenderConfig::from_lookup(lookup_from(&env)).expect("should parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "top_k", .. })
        ));
    }

    #[test]
    fn log_directive_accepts_python_level_names() {
        assert_eq!(log_directive("WARNING"), "warn");
        assert_eq!(log_directive("critical"), "error");
        assert_eq!(log_directive(" Debug "), "debug");
        assert_eq!(log_directive(""), "warn");
    }
}
