//! OpenAI-compatible backend.
//!
//! Sends chat completions to any endpoint speaking the OpenAI wire format
//! with bearer authentication. Both upstream providers this service talks to
//! use this shape; only base URL, key, and model differ per slot.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;

use crate::backends::{BackendError, ChatBackend, Completion, CompletionRequest};
use crate::config::BackendConfig;

// ---------------------------------------------------------------------------
// Response deserialization
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct OaiResponse {
    #[serde(default)]
    choices: Vec<OaiChoice>,
    #[serde(default)]
    usage: Option<OaiUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiChoice {
    #[serde(default)]
    message: Option<OaiMessage>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiUsage {
    #[serde(default)]
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// OpenAiBackend
// ---------------------------------------------------------------------------

pub struct OpenAiBackend {
    id: String,
    config: BackendConfig,
    client: Client,
}

impl OpenAiBackend {
    /// Create a backend from its config slot. The API key and timeout are
    /// fixed at construction; nothing is read from the environment per call.
    pub fn new(id: impl Into<String>, config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            id: id.into(),
            config,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.url.trim_end_matches('/'))
    }

    /// Build the request body in the OpenAI wire shape.
    fn build_request_body(request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
        })
    }

    fn convert_response(oai: OaiResponse) -> Result<Completion, BackendError> {
        let text = oai
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| BackendError::Parse("response contained no message content".into()))?;

        Ok(Completion {
            text,
            total_tokens: oai.usage.map(|u| u.total_tokens).unwrap_or_default(),
        })
    }
}

impl ChatBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn chat(
        &self,
        request: &CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, BackendError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move {
            let url = self.completions_url();
            let body = Self::build_request_body(&request);

            let mut req = self.client.post(&url).json(&body);
            if let Some(ref key) = self.config.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.config.timeout_secs)
                } else {
                    BackendError::Http(e)
                }
            })?;

            let status = resp.status();
            if !status.is_success() {
                let code = status.as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(BackendError::Api {
                    status: code,
                    message: body,
                });
            }

            let oai: OaiResponse = resp
                .json()
                .await
                .map_err(|e| BackendError::Parse(e.to_string()))?;

            Self::convert_response(oai)
        })
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let url = format!("{}/models", self.config.url.trim_end_matches('/'));
            let mut req = self.client.get(&url);
            if let Some(ref key) = self.config.api_key {
                req = req.bearer_auth(key);
            }

            match req.timeout(Duration::from_secs(5)).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
