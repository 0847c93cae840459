//! Classification client over a hosted text-generation backend.
//!
//! The transport lives behind [`InferenceClient`] and is allowed to fail; the
//! operations on [`ClassificationClient`] are not. Every operation degrades
//! to a documented neutral fallback on transport errors, timeouts, or
//! malformed model output, so classifier unavailability can never punish a
//! user ("assume not spam", never "assume spam").

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::Result;

/// Fixed sentinel returned when translation is unavailable.
pub const TRANSLATION_FAILED: &str = "Translation failed";
/// Fixed sentinel returned when summarization is unavailable.
pub const SUMMARIZATION_FAILED: &str = "Summarization failed";
/// Fixed sentinel returned when response generation is unavailable.
pub const RESPONSE_FAILED: &str = "I'm sorry, I couldn't process your request right now.";

/// Port for the raw inference backend: prompt in, completion text out.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpamAnalysis {
    pub is_spam: bool,
    pub confidence: f32,
    pub reason: String,
}

impl Default for SpamAnalysis {
    fn default() -> Self {
        Self {
            is_spam: false,
            confidence: 0.0,
            reason: "No specific reason".to_string(),
        }
    }
}

impl SpamAnalysis {
    pub fn fallback() -> Self {
        Self {
            is_spam: false,
            confidence: 0.0,
            reason: "Analysis failed".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SentimentAnalysis {
    pub sentiment: Sentiment,
    pub score: f32,
    pub emotions: Vec<String>,
}

impl SentimentAnalysis {
    pub fn fallback() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModerationAnalysis {
    pub should_moderate: bool,
    pub categories: Vec<String>,
    pub severity: f32,
}

impl ModerationAnalysis {
    pub fn fallback() -> Self {
        Self::default()
    }
}

/// Structured judgments over free text, with the never-fail contract.
pub struct ClassificationClient {
    inner: Arc<dyn InferenceClient>,
}

impl ClassificationClient {
    pub fn new(inner: Arc<dyn InferenceClient>) -> Self {
        Self { inner }
    }

    pub async fn classify_spam(&self, text: &str) -> SpamAnalysis {
        let prompt = format!(
            "Analyze this message for spam content. Consider promotional content, \
             scams, excessive links, repetitive text, and inappropriate content.\n\n\
             Message: \"{text}\"\n\n\
             Respond with JSON format:\n\
             {{\n  \"isSpam\": boolean,\n  \"confidence\": number (0-1),\n  \"reason\": \"brief explanation\"\n}}"
        );

        match self.structured::<SpamAnalysis>(&prompt, 200).await {
            Ok(v) => v,
            Err(e) => {
                warn!("spam analysis unavailable: {e}");
                SpamAnalysis::fallback()
            }
        }
    }

    pub async fn classify_sentiment(&self, text: &str) -> SentimentAnalysis {
        let prompt = format!(
            "Analyze the sentiment and emotions in this message:\n\n\
             Message: \"{text}\"\n\n\
             Respond with JSON format:\n\
             {{\n  \"sentiment\": \"positive/negative/neutral\",\n  \"score\": number (-1 to 1),\n  \"emotions\": [\"emotion1\", \"emotion2\"]\n}}"
        );

        match self.structured::<SentimentAnalysis>(&prompt, 150).await {
            Ok(v) => v,
            Err(e) => {
                warn!("sentiment analysis unavailable: {e}");
                SentimentAnalysis::fallback()
            }
        }
    }

    pub async fn classify_moderation(&self, text: &str) -> ModerationAnalysis {
        let prompt = format!(
            "Analyze this content for moderation. Check for hate speech, harassment, \
             violence, adult content, and other inappropriate material.\n\n\
             Content: \"{text}\"\n\n\
             Respond with JSON format:\n\
             {{\n  \"shouldModerate\": boolean,\n  \"categories\": [\"category1\", \"category2\"],\n  \"severity\": number (1-10)\n}}"
        );

        match self.structured::<ModerationAnalysis>(&prompt, 150).await {
            Ok(v) => v,
            Err(e) => {
                warn!("content moderation unavailable: {e}");
                ModerationAnalysis::fallback()
            }
        }
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> String {
        let prompt = format!(
            "Translate this text to {target_language}:\n\n\"{text}\"\n\n\
             Only respond with the translation, no additional text."
        );

        match self.inner.complete(&prompt, 500).await {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            Ok(_) => TRANSLATION_FAILED.to_string(),
            Err(e) => {
                warn!("translation unavailable: {e}");
                TRANSLATION_FAILED.to_string()
            }
        }
    }

    pub async fn summarize(&self, text: &str, max_length: usize) -> String {
        let prompt = format!(
            "Summarize this text in maximum {max_length} characters:\n\n\"{text}\"\n\n\
             Provide a concise summary that captures the main points."
        );

        let max_tokens = (max_length as u32).div_ceil(2);
        match self.inner.complete(&prompt, max_tokens).await {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            Ok(_) => SUMMARIZATION_FAILED.to_string(),
            Err(e) => {
                warn!("summarization unavailable: {e}");
                SUMMARIZATION_FAILED.to_string()
            }
        }
    }

    pub async fn respond(&self, context: &str, user_message: &str) -> String {
        let prompt = format!(
            "You are a helpful group management bot assistant. Based on the context \
             and user message, provide a helpful response.\n\n\
             Context: {context}\nUser message: \"{user_message}\"\n\n\
             Provide a helpful, friendly response (max 200 characters):"
        );

        match self.inner.complete(&prompt, 100).await {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            Ok(_) => RESPONSE_FAILED.to_string(),
            Err(e) => {
                warn!("response generation unavailable: {e}");
                RESPONSE_FAILED.to_string()
            }
        }
    }

    async fn structured<T: for<'de> Deserialize<'de>>(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<T> {
        let raw = self.inner.complete(prompt, max_tokens).await?;
        let json = extract_first_json_object(&raw).ok_or_else(|| {
            crate::Error::External(format!(
                "model did not return JSON: {}",
                crate::format::truncate_text(&raw, 120)
            ))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Pull the first balanced `{...}` object out of model chatter.
fn extract_first_json_object(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut start: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'{' {
            if depth == 0 {
                start = Some(i);
            }
            depth += 1;
        } else if b == b'}' && depth > 0 {
            depth -= 1;
            if depth == 0 {
                let st = start?;
                return Some(s[st..=i].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(String);

    #[async_trait]
    impl InferenceClient for Canned {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl InferenceClient for Failing {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            Err(crate::Error::External("inference timed out".to_string()))
        }
    }

    fn client(inner: impl InferenceClient + 'static) -> ClassificationClient {
        ClassificationClient::new(Arc::new(inner))
    }

    #[tokio::test]
    async fn parses_spam_judgment_from_chatter() {
        let c = client(Canned(
            "Sure! Here is the analysis:\n{\"isSpam\": true, \"confidence\": 0.92, \"reason\": \"crypto shilling\"}\nHope this helps.".to_string(),
        ));
        let v = c.classify_spam("BUY NOW").await;
        assert!(v.is_spam);
        assert!((v.confidence - 0.92).abs() < 1e-6);
        assert_eq!(v.reason, "crypto shilling");
    }

    #[tokio::test]
    async fn spam_falls_back_on_transport_error() {
        let c = client(Failing);
        let v = c.classify_spam("hello").await;
        assert_eq!(v, SpamAnalysis::fallback());
        assert!(!v.is_spam);
        assert_eq!(v.confidence, 0.0);
    }

    #[tokio::test]
    async fn spam_falls_back_on_non_json_output() {
        let c = client(Canned("I cannot answer that.".to_string()));
        let v = c.classify_spam("hello").await;
        assert_eq!(v, SpamAnalysis::fallback());
    }

    #[tokio::test]
    async fn missing_fields_take_neutral_values() {
        let c = client(Canned("{\"isSpam\": true}".to_string()));
        let v = c.classify_spam("x").await;
        assert!(v.is_spam);
        assert_eq!(v.confidence, 0.0);
        assert_eq!(v.reason, "No specific reason");
    }

    #[tokio::test]
    async fn sentiment_parses_and_falls_back() {
        let c = client(Canned(
            "{\"sentiment\": \"negative\", \"score\": -0.9, \"emotions\": [\"anger\"]}".to_string(),
        ));
        let v = c.classify_sentiment("awful").await;
        assert_eq!(v.sentiment, Sentiment::Negative);
        assert!((v.score - -0.9).abs() < 1e-6);

        let v = client(Failing).classify_sentiment("awful").await;
        assert_eq!(v.sentiment, Sentiment::Neutral);
        assert_eq!(v.score, 0.0);
        assert!(v.emotions.is_empty());
    }

    #[tokio::test]
    async fn moderation_falls_back() {
        let v = client(Failing).classify_moderation("text").await;
        assert!(!v.should_moderate);
        assert!(v.categories.is_empty());
        assert_eq!(v.severity, 0.0);
    }

    #[tokio::test]
    async fn text_operations_use_sentinels() {
        let c = client(Failing);
        assert_eq!(c.translate("hola", "en").await, TRANSLATION_FAILED);
        assert_eq!(c.summarize("long text", 100).await, SUMMARIZATION_FAILED);
        assert_eq!(c.respond("ctx", "msg").await, RESPONSE_FAILED);

        let c = client(Canned("  hello  ".to_string()));
        assert_eq!(c.translate("hola", "en").await, "hello");
    }

    #[test]
    fn extracts_balanced_object() {
        assert_eq!(
            extract_first_json_object("noise {\"a\": {\"b\": 1}} trailing"),
            Some("{\"a\": {\"b\": 1}}".to_string())
        );
        assert_eq!(extract_first_json_object("no json here"), None);
        assert_eq!(extract_first_json_object("unbalanced {\"a\": 1"), None);
    }
}
