//! Inference adapter (OpenAI-compatible chat completions).
//!
//! Implements `warden-core`'s `InferenceClient` port over an HTTP
//! chat-completions endpoint. Transport and parse failures surface as
//! errors here; the core's classification client is what turns them into
//! neutral fallbacks.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use warden_core::{classify::InferenceClient, errors::Error, Result};

#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
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
    temperature: f32,
    max_tokens: u32,
}

#[async_trait]
impl InferenceClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            // Classification prompts want determinism.
            temperature: 0.0,
            max_tokens,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("inference request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "inference request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("inference json error: {e}")))?;

        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(Error::External(
                "inference response missing message content".to_string(),
            ));
        }

        Ok(content)
    }
}

/// Stand-in used when no API key is configured. Always errors, which the
/// core's classification client degrades to its neutral fallbacks.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineInference;

#[async_trait]
impl InferenceClient for OfflineInference {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        Err(Error::External("no inference backend configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_core::classify::{ClassificationClient, SpamAnalysis};

    #[tokio::test]
    async fn offline_backend_degrades_to_fallbacks() {
        let client = ClassificationClient::new(Arc::new(OfflineInference));
        assert_eq!(client.classify_spam("anything").await, SpamAnalysis::fallback());
    }
}
