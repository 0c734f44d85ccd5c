use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AgentError;

/// A bounded inference request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Token counts metered by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Raw reply: free text expected (but not trusted) to contain one JSON
/// decision object, plus the billable usage.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// Remote inference service. Mockable for tests.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceReply, AgentError>;
}

/// Chat-completions style HTTP provider (OpenRouter-compatible).
pub struct HttpInference {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: TokenUsage,
}

impl HttpInference {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl InferenceProvider for HttpInference {
    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceReply, AgentError> {
        debug!(model = %request.model, "Invoking inference provider");

        let payload = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send(),
        )
        .await
        .map_err(|_| AgentError::Timeout(self.timeout.as_secs()))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Inference provider rejected request");
            return Err(AgentError::Inference(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(AgentError::Inference("empty response".to_string()));
        }

        Ok(InferenceReply {
            content,
            usage: parsed.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_deserialization() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"decision\": \"HOLD\"}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.usage.prompt_tokens, 120);
        assert_eq!(parsed.usage.completion_tokens, 40);
    }

    #[test]
    fn chat_response_tolerates_missing_usage() {
        let body = r#"{"choices": [{"message": {"content": "hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.usage, TokenUsage::default());
    }

    #[test]
    fn base_url_normalized() {
        let provider = HttpInference::new(
            "https://openrouter.ai/api/v1/",
            "key",
            Duration::from_secs(45),
        )
        .unwrap();
        assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");
    }
}
