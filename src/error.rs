use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutocapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audio extraction error: {0}")]
    Extraction(String),

    #[error("Script conversion error: {0}")]
    Conversion(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Translation credential error: {0}")]
    Credential(String),

    #[error("Subtitle assembly invariant violated: {0}")]
    Assembly(String),

    #[error("Queue control error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl AutocapError {
    /// Credential failures get a different remedy than generic translation
    /// failures (fix the key vs. retry or fall back to the local backend).
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }
}

pub type Result<T> = std::result::Result<T, AutocapError>;
