//! Narrative adapters (OpenAI-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ports::NarrativePort;

// =============================================================================
// Null adapter
// =============================================================================

/// Default narrative adapter: generation is unavailable. Callers treat the
/// error as "skip the flavor text".
#[derive(Debug, Clone, Default)]
pub struct NullNarrative;

#[async_trait]
impl NarrativePort for NullNarrative {
    async fn generate(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, EngineError> {
        Err(EngineError::narrative("no narrative backend configured"))
    }
}

// =============================================================================
// HTTP adapter
// =============================================================================

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct HttpNarrative {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpNarrative {
    pub fn new(base_url: &str, model: &str) -> Self {
        // Generation can be slow; allow a generous timeout.
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl NarrativePort for HttpNarrative {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, EngineError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::narrative(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| EngineError::narrative(e.to_string()))?;
            return Err(EngineError::narrative(error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::narrative(format!("invalid response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::narrative("response contained no choices"))
    }
}
