use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// One turn in a chat-style completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<ToolSchema>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    ToolCallDelta { id: String, args_delta: String },
    Done { finish_reason: String, usage: Option<TokenUsage> },
}

/// The language-model collaborator named in the external-interfaces
/// section: completion, streaming, and embedding, plus a health check the
/// orchestrator can poll before routing work to it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, String>;

    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: &LlmConfig,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, String>> + Send>>, String> {
        let response = self.complete(messages, config).await?;
        let chunks = vec![
            Ok(StreamChunk::TextDelta(response.content.unwrap_or_default())),
            Ok(StreamChunk::Done {
                finish_reason: response.finish_reason.unwrap_or_else(|| "stop".to_string()),
                usage: response.usage,
            }),
        ];
        if cancel.is_cancelled() {
            return Ok(Box::pin(futures::stream::empty()));
        }
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Deterministic in-process provider used for tests and `demo` mode: it
/// never makes a network call and just echoes a canned response.
pub struct LocalEchoLlmProvider;

#[async_trait]
impl LlmProvider for LocalEchoLlmProvider {
    fn id(&self) -> &str {
        "local-echo"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _config: &LlmConfig,
    ) -> Result<LlmResponse, String> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(LlmResponse {
            content: Some(format!("Echo: {last}")),
            finish_reason: Some("stop".to_string()),
            model: Some(self.id().to_string()),
            ..Default::default()
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 8];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % vector.len()] += byte as f32;
                }
                vector
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_completes_with_last_message() {
        let provider = LocalEchoLlmProvider;
        let response = provider
            .complete(
                &[ChatMessage {
                    role: "user".to_string(),
                    content: "hello".to_string(),
                }],
                &LlmConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("Echo: hello"));
    }
}
