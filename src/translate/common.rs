use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: serde_json::Value,
}

impl ChatResponse {
    /// Text of the first choice. Content may be a plain string or a list of
    /// `{ "text": ... }` parts.
    pub fn first_text(&self) -> Option<String> {
        let content = &self.choices.first()?.message.as_ref()?.content;
        match content {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(parts) => Some(
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect::<String>(),
            ),
            _ => None,
        }
    }
}

/// Display name used in prompts; unknown codes fall back to the code itself.
pub fn language_display_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "zh" | "zh-cn" | "zh-hans" => "Simplified Chinese".to_string(),
        "zh-tw" | "zh-hant" => "Traditional Chinese".to_string(),
        "en" => "English".to_string(),
        "ja" => "Japanese".to_string(),
        "ko" => "Korean".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "es" => "Spanish".to_string(),
        "ru" => "Russian".to_string(),
        "it" => "Italian".to_string(),
        "pt" => "Portuguese".to_string(),
        _ => code.to_string(),
    }
}

/// System prompt for single-unit translation.
pub fn build_translation_prompt(target_language: &str, context: Option<&str>) -> String {
    let language_name = language_display_name(target_language);
    let mut prompt = format!(
        "You are a professional translator. Translate the user's text into {}.\n\
         \n\
         Requirements:\n\
         1. Keep the original formatting (Markdown, HTML tags and attributes) unchanged\n\
         2. Convey the meaning accurately and read naturally in {}\n\
         3. Keep terminology consistent\n\
         4. Do not translate code or URLs\n\
         \n\
         Output only the translation, without explanations.",
        language_name, language_name
    );

    if let Some(ctx) = context {
        if !ctx.trim().is_empty() {
            prompt.push_str(&format!(
                "\n\n[Preceding translated text, for terminology reference only - do not translate or repeat it]\n{}",
                ctx
            ));
        }
    }

    prompt
}

/// System prompt for marker-multiplexed batch translation.
pub fn build_batch_prompt(target_language: &str) -> String {
    let language_name = language_display_name(target_language);
    format!(
        "You are a professional translator. The user's message contains several blocks; \
         each block starts with a marker line of the form [ID:<id>].\n\
         \n\
         Translate every block into {}. For each block, output its marker line exactly as given, \
         followed by the translation of that block.\n\
         Do not merge, split, reorder or drop blocks. Keep Markdown and HTML formatting unchanged. \
         Do not translate code or URLs. Output nothing else.",
        language_name
    )
}
