// Translation capability
//
// The pipeline only depends on the `Translator` trait:
// - translate: one unit, with an optional advisory context hint
// - translate_batch: several caller-identified blocks multiplexed into one call
//   through the `[ID:<id>]` marker protocol (see `protocol`)
//
// `ChatTranslator` is the provider implementation for OpenAI-compatible
// chat-completions endpoints.

pub mod chat;
pub mod common;
pub mod protocol;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use chat::ChatTranslator;
pub use common::language_display_name;
use crate::config::TranslatorConfig;
use crate::error::Result;

/// Caller-identified unit for batched translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub text: String,
}

impl Block {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Main trait for translation operations
#[async_trait]
pub trait Translator: Send + Sync {
    /// Fail with `Configuration` when the provider cannot be used at all.
    fn check_configured(&self) -> Result<()>;

    /// Translate a single unit. `context` is a best-effort consistency hint.
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: Option<&str>,
    ) -> Result<String>;

    /// Translate several blocks in one call. Ids missing from the provider's
    /// reply are simply absent from the returned map.
    async fn translate_batch(
        &self,
        blocks: &[Block],
        target_language: &str,
    ) -> Result<HashMap<String, String>>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_translator(config: TranslatorConfig) -> Result<Arc<dyn Translator>> {
        Ok(Arc::new(ChatTranslator::new(config)?))
    }
}
