//! OpenAI-compatible chat completions client.
//!
//! Works against any `POST {base_url}/chat/completions` endpoint; the default
//! points at Gemini's compatibility layer. HTTP failures are mapped onto
//! [`ProviderErrorKind`] so the retry policy can tell transient from terminal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use coordination::{
    ChatRole, CompletionProvider, CompletionRequest, ProviderError, ProviderErrorKind,
};

use crate::config::ProviderSettings;

/// Longest slice of an error body carried into a [`ProviderError`].
const ERROR_BODY_LIMIT: usize = 300;

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(settings: &ProviderSettings, api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: api_key.into(),
            max_tokens: settings.max_tokens,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &m.content,
        }));
        ChatCompletionBody {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        debug!(
            purpose = %request.purpose,
            messages = request.messages.len(),
            temperature = request.temperature,
            "chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                classify_status(status),
                format!("HTTP {status}: {}", truncate(&text, ERROR_BODY_LIMIT)),
            ));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("unreadable completion body: {e}")))?;

        // no choices is an empty answer; the proposer handles short output
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Map an HTTP status onto a provider error kind.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        429 => ProviderErrorKind::RateLimited,
        500 | 502 | 503 | 504 => ProviderErrorKind::Unavailable,
        401 | 403 => ProviderErrorKind::Auth,
        400 | 404 | 413 | 422 => ProviderErrorKind::Malformed,
        _ => ProviderErrorKind::Other,
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() || e.is_connect() {
        ProviderErrorKind::Unavailable
    } else if e.is_decode() || e.is_body() {
        ProviderErrorKind::Malformed
    } else {
        ProviderErrorKind::Other
    };
    ProviderError::new(kind, e.to_string())
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Check if the endpoint is reachable and accepts the key (GET /models).
pub async fn check_endpoint(base_url: &str, api_key: &str) -> bool {
    let models_url = format!("{}/models", base_url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .bearer_auth(api_key)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
