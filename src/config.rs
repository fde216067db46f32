use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{ParatransError, Result};

fn default_context_chars() -> usize {
    200
}

fn default_source_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub translator: TranslatorConfig,
    pub segmenter: SegmenterConfig,
    pub orchestrator: OrchestratorConfig,
    pub blocks: BlocksConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// OpenAI-compatible base URL (without the `/chat/completions` suffix)
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Bearer token; empty means unconfigured
    pub api_key: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Completion budget per call
    pub max_tokens: u32,
    /// Extra attempts after a failed call
    pub max_retries: u32,
    /// Source language used to build cache language pairs
    #[serde(default = "default_source_language")]
    pub source_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Soft upper bound on segment length, in characters
    pub max_length: usize,
    /// Parse markup tag-aware when the input contains tags
    pub preserve_structure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrently in-flight translator calls per job
    pub max_concurrent: usize,
    /// Number of preceding segments offered as context
    pub context_window: usize,
    /// Characters kept from each context segment
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksConfig {
    /// Blocks packed into one provider call
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding persisted paragraph maps
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translator: TranslatorConfig::default(),
            segmenter: SegmenterConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            blocks: BlocksConfig::default(),
            store: StoreConfig {
                path: ".paratrans/paragraphs".to_string(),
            },
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            model: "glm-4-flash".to_string(),
            api_key: String::new(),
            timeout_secs: 90,
            max_tokens: 2048,
            max_retries: 1,
            source_language: default_source_language(),
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_length: 1000,
            preserve_structure: true,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            context_window: 1,
            context_chars: default_context_chars(),
        }
    }
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self { batch_size: 5 }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ParatransError::Configuration(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ParatransError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ParatransError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ParatransError::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Overlay provider credentials from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(key) = lookup("PARATRANS_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.translator.api_key = key;
        }
        if let Some(endpoint) = lookup("PARATRANS_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            self.translator.endpoint = endpoint;
        }
        if let Some(model) = lookup("PARATRANS_MODEL").filter(|v| !v.trim().is_empty()) {
            self.translator.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent == 0 {
            return Err(ParatransError::Configuration(
                "orchestrator.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.blocks.batch_size == 0 {
            return Err(ParatransError::Configuration(
                "blocks.batch_size must be at least 1".to_string(),
            ));
        }
        if self.segmenter.max_length == 0 {
            return Err(ParatransError::Configuration(
                "segmenter.max_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
