use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParatransError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Translator unusable (missing key, endpoint or model). Fatal for the whole request.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl ParatransError {
    /// Only configuration problems abort a request; everything else is absorbed per unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, ParatransError>;
