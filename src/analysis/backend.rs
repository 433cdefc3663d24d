//! Chat backend abstraction and the Ollama implementation.
//!
//! The analysis stages treat the LLM as an opaque text-in/text-out
//! collaborator behind two small traits. [`ChatBackend::session`] is the
//! authorization step: it may fail with a credential or network error, and
//! each stage calls it independently so a session failure stays local to the
//! stage that needed one. [`ChatSession::send`] is the blocking prompt/reply
//! exchange.
//!
//! [`OllamaBackend`] talks to a local or remote Ollama server. Tests inject
//! their own `ChatBackend` via [`crate::PipelineConfig`] instead.

use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A chat backend that can open sessions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Acquire a session. Called once per analysis stage; failures are
    /// recovered per-stage by the orchestrator.
    async fn session(&self) -> Result<Box<dyn ChatSession>, BackendError>;
}

/// An authorized conversation handle.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one prompt and wait for the complete raw reply.
    async fn send(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Model used when neither config nor `SCANFUSE_MODEL` names one.
const DEFAULT_MODEL: &str = "llama3.1";

/// Endpoint used when neither config nor `OLLAMA_HOST` names one.
const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Chat backend speaking the Ollama HTTP API.
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    temperature: f32,
    num_predict: u32,
    client: Client,
}

impl OllamaBackend {
    /// Create a backend against an explicit endpoint and model.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        num_predict: u32,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
            num_predict,
            client,
        })
    }

    /// Resolve endpoint and model from explicit values, then the
    /// environment (`OLLAMA_HOST`, `SCANFUSE_MODEL`), then built-in defaults.
    pub fn from_env(
        endpoint: Option<&str>,
        model: Option<&str>,
        temperature: f32,
        num_predict: u32,
    ) -> Result<Self, BackendError> {
        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = model
            .map(str::to_string)
            .or_else(|| std::env::var("SCANFUSE_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(endpoint, model, temperature, num_predict)
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn session(&self) -> Result<Box<dyn ChatSession>, BackendError> {
        // /api/tags doubles as the reachability + authorization probe.
        let url = format!("{}/api/tags", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 {
            return Err(BackendError::Authorization(format!(
                "HTTP {} from {}",
                resp.status(),
                url
            )));
        }
        if !resp.status().is_success() {
            return Err(BackendError::Api(format!("HTTP {}", resp.status())));
        }

        debug!(endpoint = %self.endpoint, model = %self.model, "ollama session established");

        Ok(Box::new(OllamaSession {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            num_predict: self.num_predict,
            client: self.client.clone(),
        }))
    }
}

struct OllamaSession {
    endpoint: String,
    model: String,
    temperature: f32,
    num_predict: u32,
    client: Client,
}

/// Ollama generate-API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama generate-API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

#[async_trait]
impl ChatSession for OllamaSession {
    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(BackendError::Api(format!("HTTP {}", resp.status())));
        }

        let body: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Api(format!("malformed response: {e}")))?;

        debug!(chars = body.response.len(), "ollama reply received");
        Ok(body.response)
    }
}
