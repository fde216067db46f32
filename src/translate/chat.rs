use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TranslatorConfig;
use crate::error::{ParatransError, Result};
use super::common::{build_batch_prompt, build_translation_prompt, ChatMessage, ChatRequest, ChatResponse};
use super::{protocol, Block, Translator};

/// Translator backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatTranslator {
    client: Client,
    config: TranslatorConfig,
}

impl ChatTranslator {
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    /// Send one chat request, retrying failed attempts up to `max_retries` times.
    async fn complete(&self, system_prompt: String, user_content: String) -> Result<String> {
        self.check_configured()?;

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_content)],
            max_tokens: self.config.max_tokens,
        };

        let attempts = self.config.max_retries + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.complete_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Chat completion attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ParatransError::Translation("Chat completion failed without a response".to_string())
        }))
    }

    async fn complete_once(&self, request: &ChatRequest) -> Result<String> {
        let url = self.completions_url();
        debug!("Sending chat completion request to: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ParatransError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ParatransError::Translation(format!(
                "Provider error {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ParatransError::Parse(format!("Failed to parse response: {}", e)))?;

        let text = parsed.first_text().unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(ParatransError::Translation("Empty translation received".to_string()));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Translator for ChatTranslator {
    fn check_configured(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("endpoint", &self.config.endpoint),
            ("model", &self.config.model),
            ("api_key", &self.config.api_key),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ParatransError::Configuration(format!(
                "Translator is not configured: missing {}",
                missing.join(", ")
            )))
        }
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let prompt = build_translation_prompt(target_language, context);
        self.complete(prompt, text.to_string()).await
    }

    async fn translate_batch(
        &self,
        blocks: &[Block],
        target_language: &str,
    ) -> Result<HashMap<String, String>> {
        if blocks.is_empty() {
            return Ok(HashMap::new());
        }
        let reply = self
            .complete(build_batch_prompt(target_language), protocol::format_batch_prompt(blocks))
            .await?;
        let parsed = protocol::parse_batch_response(&reply, blocks);
        if parsed.len() < blocks.len() {
            debug!(
                "Batch reply covered {}/{} blocks",
                parsed.len(),
                blocks.len()
            );
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str) -> TranslatorConfig {
        TranslatorConfig {
            api_key: api_key.to_string(),
            ..TranslatorConfig::default()
        }
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let translator = ChatTranslator::new(config("")).unwrap();
        let err = translator.check_configured().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_configured_translator_passes_check() {
        let translator = ChatTranslator::new(config("key")).unwrap();
        assert!(translator.check_configured().is_ok());
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let translator = ChatTranslator::new(TranslatorConfig {
            endpoint: "http://localhost:8080/v1/".to_string(),
            ..config("key")
        })
        .unwrap();
        assert_eq!(translator.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_unconfigured_translate_fails_before_network() {
        let translator = ChatTranslator::new(config("")).unwrap();
        let err = translator.translate("Hello", "zh", None).await.unwrap_err();
        assert!(matches!(err, ParatransError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_call() {
        let translator = ChatTranslator::new(config("")).unwrap();
        assert!(translator.translate_batch(&[], "zh").await.unwrap().is_empty());
    }
}
