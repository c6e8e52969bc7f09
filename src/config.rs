use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AutocapError, Result};
use crate::translate::TranslationBackend;

fn default_max_prompt_keywords() -> usize {
    40
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub glossary: GlossaryConfig,
    pub media: MediaConfig,
    pub convert: ConvertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory for uploaded inputs, extracted audio, produced
    /// subtitles, and per-job logs
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PathsConfig {
    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("videos")
    }

    pub fn audios_dir(&self) -> PathBuf {
        self.data_dir.join("audios")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.data_dir.join("transcripts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Path to the whisper CLI binary
    pub binary_path: String,
    /// Default model when a job carries no override
    pub model: String,
    /// Models a job override may select
    pub allowed_models: Vec<String>,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            binary_path: "whisper".to_string(),
            model: "base".to_string(),
            allowed_models: vec![
                "tiny".to_string(),
                "base".to_string(),
                "small".to_string(),
                "medium".to_string(),
                "large".to_string(),
                "large-v2".to_string(),
                "large-v3".to_string(),
            ],
        }
    }
}

impl TranscriberConfig {
    /// Resolve a per-job model override against the allowed set.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String> {
        match requested {
            None => Ok(self.model.clone()),
            Some(name) => {
                if self.allowed_models.iter().any(|m| m == name) {
                    Ok(name.to_string())
                } else {
                    Err(AutocapError::Config(format!(
                        "Invalid model selection '{}'. Allowed models: {}",
                        name,
                        self.allowed_models.join(", ")
                    )))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Backend used when a job carries no override
    pub backend: TranslationBackend,
    /// Local LLM endpoint URL (Ollama-compatible)
    pub endpoint: String,
    /// Model served by the local endpoint
    pub model: String,
    pub cloud: CloudConfig,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackend::Local,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            cloud: CloudConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Chat-completions endpoint base URL
    pub endpoint: String,
    /// Provider identifier (e.g. "gpt", "gemini")
    pub provider: String,
    /// Model identifier; empty selects the provider default
    pub model: String,
    /// API credential; may also arrive as a per-job override
    pub api_key: Option<String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            provider: "gpt".to_string(),
            model: String::new(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlossaryConfig {
    /// Long-lived term store (single JSON file)
    pub store_path: PathBuf,
    /// Cap on filename-inferred keywords appended to the whisper prompt
    pub max_prompt_keywords: usize,
}

impl Default for GlossaryConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data").join("glossary.json"),
            max_prompt_keywords: default_max_prompt_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to the ffmpeg binary
    pub binary_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Path to the opencc binary used for Chinese script conversion
    pub binary_path: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            binary_path: "opencc".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutocapError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AutocapError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AutocapError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| AutocapError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.transcriber.model, "base");
        assert_eq!(parsed.translate.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config =
            toml::from_str("[transcriber]\nmodel = \"small\"\n").unwrap();
        assert_eq!(parsed.transcriber.model, "small");
        assert_eq!(parsed.transcriber.binary_path, "whisper");
        assert_eq!(parsed.media.binary_path, "ffmpeg");
        assert_eq!(parsed.glossary.max_prompt_keywords, 40);
        assert_eq!(parsed.convert.binary_path, "opencc");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "transcriber = \"not a table\"").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, crate::error::AutocapError::Config(_)));

        let err = Config::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, crate::error::AutocapError::Config(_)));
    }

    #[test]
    fn test_resolve_model_override() {
        let config = Config::default();
        assert_eq!(config.transcriber.resolve_model(None).unwrap(), "base");
        assert_eq!(
            config.transcriber.resolve_model(Some("small")).unwrap(),
            "small"
        );
        assert!(config.transcriber.resolve_model(Some("gigantic")).is_err());
    }

    #[test]
    fn test_data_paths() {
        let paths = PathsConfig {
            data_dir: PathBuf::from("data"),
        };
        assert_eq!(paths.videos_dir(), PathBuf::from("data/videos"));
        assert_eq!(paths.transcripts_dir(), PathBuf::from("data/transcripts"));
    }
}
