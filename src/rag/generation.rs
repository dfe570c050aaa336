// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-completion gateway used to turn retrieved context into an answer.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::errors::{RagError, Result};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Anything that can complete a conversation.
pub trait GenerationGateway: Send + Sync {
    /// Returns the assistant reply to `messages`.
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleGateway {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: Client,
}

impl OpenAiCompatibleGateway {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RagError::GenerationFailure(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
            max_tokens,
            temperature,
            timeout,
            client,
        })
    }

    /// Builds a gateway from configuration. `None` when no API token is set.
    pub fn from_config(config: &GenerationConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key() else {
            tracing::warn!(
                var = config.api_key_env(),
                "no API token found; answers will report the gateway as unavailable"
            );
            return Ok(None);
        };
        Self::new(
            config.base_url(),
            api_key,
            config.model().to_string(),
            config.max_tokens(),
            config.temperature(),
            Duration::from_secs(config.timeout_secs()),
        )
        .map(Some)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_transport(&self, err: reqwest::Error) -> RagError {
        if err.is_timeout() {
            RagError::GenerationTimeout(self.timeout)
        } else {
            RagError::GenerationFailure(err.to_string())
        }
    }
}

impl GenerationGateway for OpenAiCompatibleGateway {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| RagError::GenerationFailure("invalid API token".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
        };

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "calling generation gateway");
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .map_err(|err| self.map_transport(err))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::GenerationFailure(format!(
                "gateway returned {}: {}",
                status,
                text.trim()
            )));
        }

        let parsed: ChatResponse = resp.json().map_err(|err| {
            if err.is_timeout() {
                RagError::GenerationTimeout(self.timeout)
            } else {
                RagError::GenerationFailure(format!("failed to parse gateway response: {err}"))
            }
        })?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| RagError::GenerationFailure("gateway returned no choices".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
