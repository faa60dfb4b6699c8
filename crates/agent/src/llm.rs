use std::time::Duration;

use async_trait::async_trait;
use raterbot_core::config::LlmConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    /// Deterministic request; every call site in this crate wants temperature 0.
    pub fn deterministic(messages: Vec<ChatMessage>) -> Self {
        Self { messages, temperature: 0.0 }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm response contained no choices")]
    EmptyResponse,
    #[error("llm client configuration failure: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration("llm.api_key is not set".to_string()))?;
        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout { timeout_secs: self.timeout.as_secs() }
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Removes markdown code fences (with or without a language tag) that models
/// wrap around JSON or HTML payloads.
pub fn strip_code_fences(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("```") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        let tag_len = after.chars().take_while(|ch| ch.is_ascii_alphanumeric()).count();
        rest = &after[tag_len..];
    }
    output.push_str(rest);

    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{strip_code_fences, ChatMessage, ChatRequest, ChatRole};

    #[test]
    fn fences_with_language_tags_are_removed() {
        assert_eq!(strip_code_fences("```json\n{\"age\": 45}\n```"), "{\"age\": 45}");
        assert_eq!(strip_code_fences("```html\n<table></table>\n```"), "<table></table>");
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
    }

    #[test]
    fn unfenced_text_is_only_trimmed() {
        assert_eq!(strip_code_fences("  {\"state\": \"OH\"}\n"), "{\"state\": \"OH\"}");
    }

    #[test]
    fn chat_messages_serialize_with_lowercase_roles() {
        let message = ChatMessage::system("rules");
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["role"], "system");
        assert_eq!(ChatMessage::user("hi").role, ChatRole::User);
        assert_eq!(ChatRequest::deterministic(vec![message]).temperature, 0.0);
    }
}
