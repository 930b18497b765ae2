//! Model-serving gateway for embeddings and text generation.
//!
//! Calls are blocking, carry their own timeout and are never retried here.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const EMBED_TIMEOUT: Duration = Duration::from_secs(60);
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("failed to parse model response: {message}")]
    Parse { message: String },

    #[error("unexpected embed response shape (keys: {keys})")]
    UnexpectedShape { keys: String },
}

pub trait ModelGateway: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError>;

    /// Cheap reachability check for status reporting only.
    fn is_available(&self) -> bool;
}

/// Accepts both `{"embeddings": [[...]]}` and the legacy
/// `{"embedding": [...]}` body.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

pub fn parse_embed_response(body: &str) -> Result<Vec<f32>, GatewayError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|err| GatewayError::Parse {
            message: err.to_string(),
        })?;
    let keys = value
        .as_object()
        .map(|object| object.keys().cloned().collect::<Vec<String>>().join(","))
        .unwrap_or_default();

    let parsed: EmbedResponse =
        serde_json::from_value(value).map_err(|err| GatewayError::Parse {
            message: err.to_string(),
        })?;

    if let Some(first) = parsed.embeddings.into_iter().next().filter(|v| !v.is_empty()) {
        return Ok(first);
    }
    if let Some(single) = parsed.embedding.filter(|v| !v.is_empty()) {
        return Ok(single);
    }

    Err(GatewayError::UnexpectedShape { keys })
}

pub fn parse_generate_response(body: &str) -> Result<String, GatewayError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|err| GatewayError::Parse {
            message: err.to_string(),
        })?;

    parsed.response.ok_or_else(|| GatewayError::Parse {
        message: "missing 'response' field".to_string(),
    })
}

/// Client for an Ollama-compatible HTTP API.
pub struct OllamaGateway {
    base_url: String,
    embed_model: String,
    llm_model: String,
}

impl OllamaGateway {
    pub fn new(base_url: &str, embed_model: &str, llm_model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            embed_model: embed_model.to_string(),
            llm_model: llm_model.to_string(),
        }
    }

    fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let url = format!("{}{path}", self.base_url);
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        let response = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|err: ureq::Error| GatewayError::Request {
                url: url.clone(),
                message: err.to_string(),
            })?;

        response.into_string().map_err(|err| GatewayError::Parse {
            message: err.to_string(),
        })
    }
}

impl ModelGateway for OllamaGateway {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": text,
        });

        let raw = self
            .post_json("/api/embed", body, EMBED_TIMEOUT)
            .inspect_err(|err| debug!(error = %err, "ollama embed failed"))?;

        parse_embed_response(&raw).inspect_err(|err| debug!(error = %err, "ollama embed returned no vector"))
    }

    fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "model": self.llm_model,
            "prompt": prompt,
            "stream": false,
        });

        let raw = self
            .post_json("/api/generate", body, timeout)
            .inspect_err(|err| debug!(error = %err, "ollama generate failed"))?;

        parse_generate_response(&raw)
    }

    fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        let agent = ureq::AgentBuilder::new().timeout(PROBE_TIMEOUT).build();

        match agent.get(&url).call() {
            Ok(response) => response.status() == 200,
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for OllamaGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaGateway")
            .field("base_url", &self.base_url)
            .field("embed_model", &self.embed_model)
            .field("llm_model", &self.llm_model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_response_accepts_batch_shape() {
        let vector = parse_embed_response(r#"{"model":"m","embeddings":[[0.5,-1.0,2.0]]}"#)
            .expect("batch shape should parse");
        assert_eq!(vector, vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn embed_response_accepts_legacy_shape() {
        let vector =
            parse_embed_response(r#"{"embedding":[1.0,2.0]}"#).expect("legacy shape should parse");
        assert_eq!(vector, vec![1.0, 2.0]);
    }

    #[test]
    fn embed_response_without_vector_reports_keys() {
        let err = parse_embed_response(r#"{"error":"model not found"}"#)
            .expect_err("no vector present");
        assert!(matches!(err, GatewayError::UnexpectedShape { keys } if keys == "error"));
    }

    #[test]
    fn embed_response_with_empty_batch_falls_back_to_legacy_field() {
        let vector = parse_embed_response(r#"{"embeddings":[],"embedding":[3.0]}"#)
            .expect("legacy field should be used");
        assert_eq!(vector, vec![3.0]);
    }

    #[test]
    fn generate_response_requires_response_field() {
        assert_eq!(
            parse_generate_response(r#"{"response":"A quiet, wry fantasy."}"#)
                .expect("should parse"),
            "A quiet, wry fantasy."
        );
        assert!(parse_generate_response(r#"{"done":true}"#).is_err());
    }

    #[test]
    fn unreachable_server_is_reported_as_failure() {
        let gateway = OllamaGateway::new("http://127.0.0.1:1/", "nomic", "llama3.2");
        assert!(!gateway.is_available());
        assert!(matches!(
            gateway.embed("hello"),
            Err(GatewayError::Request { .. })
        ));
    }
}
