use std::time::{Duration, Instant};

use async_trait::async_trait;
use carryon_core::models::ModelInfo;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const CIRCUIT_FAILURE_LIMIT: u32 = 3;
const CIRCUIT_OPEN_FOR: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("model returned an empty body")]
    EmptyResponse,
    #[error("model circuit is open after repeated failures")]
    CircuitOpen,
    #[error("no model API key configured")]
    NotConfigured,
}

/// Capability seam for the two model calls. Tests substitute scripted
/// implementations; the orchestrator never talks to the network directly.
#[async_trait]
pub trait DecisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One JSON-mode generation at temperature zero. Exactly one attempt;
    /// retries are an orchestrator-level decision and it makes none.
    async fn generate_json(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<(String, ModelInfo), ModelError>;
}

#[derive(Debug, Default)]
struct BreakerState {
    failures: u32,
    open_until: Option<Instant>,
}

/// Gemini-style JSON-mode client with a small circuit breaker: three
/// consecutive failures fail fast for thirty seconds.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model_name: String,
    breaker: Mutex<BreakerState>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiModel {
    pub fn new(api_key: String, model_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model_name,
            breaker: Mutex::new(BreakerState::default()),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model_name, self.api_key
        )
    }

    fn check_circuit(&self) -> Result<(), ModelError> {
        let mut state = self.breaker.lock();
        if let Some(open_until) = state.open_until {
            if Instant::now() < open_until {
                return Err(ModelError::CircuitOpen);
            }
            state.open_until = None;
            state.failures = 0;
        }
        Ok(())
    }

    fn record_failure(&self) {
        let mut state = self.breaker.lock();
        state.failures += 1;
        if state.failures >= CIRCUIT_FAILURE_LIMIT {
            state.open_until = Some(Instant::now() + CIRCUIT_OPEN_FOR);
            warn!(
                model = %self.model_name,
                failures = state.failures,
                "model circuit opened"
            );
        }
    }

    fn record_success(&self) {
        let mut state = self.breaker.lock();
        state.failures = 0;
        state.open_until = None;
    }
}

#[async_trait]
impl DecisionModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate_json(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<(String, ModelInfo), ModelError> {
        if self.api_key.is_empty() {
            return Err(ModelError::NotConfigured);
        }
        self.check_circuit()?;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        let request = self.client.post(self.endpoint()).json(&body).send();
        let response = match tokio::time::timeout(timeout, request).await {
            Err(_) => {
                self.record_failure();
                return Err(ModelError::Timeout(timeout));
            }
            Ok(Err(error)) => {
                self.record_failure();
                return Err(ModelError::Transport(error.to_string()));
            }
            Ok(Ok(response)) => response,
        };

        if !response.status().is_success() {
            self.record_failure();
            return Err(ModelError::Transport(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(error) => {
                self.record_failure();
                return Err(ModelError::Transport(error.to_string()));
            }
        };

        let text = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            self.record_failure();
            return Err(ModelError::EmptyResponse);
        }

        self.record_success();
        Ok((
            text,
            ModelInfo {
                name: self.model_name.clone(),
                temperature: 0.0,
            },
        ))
    }
}
