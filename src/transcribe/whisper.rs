use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use super::{TranscribeRequest, Transcript, TranscriptionEngine};
use crate::config::TranscriberConfig;
use crate::error::{AutocapError, Result};
use crate::subtitle::Segment;

/// Whisper CLI JSON output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperOutput {
    pub text: String,
    pub segments: Vec<WhisperSegment>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl From<WhisperOutput> for Transcript {
    fn from(output: WhisperOutput) -> Self {
        let segments = output
            .segments
            .into_iter()
            .map(|seg| Segment {
                start: seg.start,
                end: seg.end,
                text: seg.text.trim().to_string(),
            })
            .collect();

        Transcript {
            text: output.text.trim().to_string(),
            segments,
            language: output.language.unwrap_or_default(),
        }
    }
}

/// Whisper CLI implementation.
pub struct WhisperTranscriber {
    config: TranscriberConfig,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        request: &TranscribeRequest,
    ) -> Result<Transcript> {
        info!(
            "Transcribing {} (model: {}, language: {})",
            audio_path.display(),
            request.model,
            request.language.as_deref().unwrap_or("auto")
        );

        let temp_dir = tempfile::tempdir().map_err(|e| {
            AutocapError::Transcription(format!("Failed to create temp directory: {}", e))
        })?;

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg(audio_path)
            .arg("--model")
            .arg(&request.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json");

        if let Some(language) = &request.language {
            cmd.arg("--language").arg(language);
        }
        if let Some(prompt) = &request.prompt {
            cmd.arg("--initial_prompt").arg(prompt);
        }

        let output = cmd.output().await.map_err(|e| {
            AutocapError::Transcription(format!("Failed to execute whisper: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutocapError::Transcription(format!(
                "Whisper failed: {}",
                stderr
            )));
        }

        let audio_stem = audio_path
            .file_stem()
            .ok_or_else(|| AutocapError::Transcription("Invalid audio filename".to_string()))?;
        let json_file = temp_dir
            .path()
            .join(format!("{}.json", audio_stem.to_string_lossy()));

        let json_content = tokio::fs::read_to_string(&json_file).await.map_err(|e| {
            AutocapError::Transcription(format!("Failed to read whisper output: {}", e))
        })?;

        let whisper_output: WhisperOutput = serde_json::from_str(&json_content).map_err(|e| {
            AutocapError::Transcription(format!("Failed to parse whisper JSON: {}", e))
        })?;

        let transcript: Transcript = whisper_output.into();
        info!(
            "Transcription complete: {} segments, detected language '{}'",
            transcript.segments.len(),
            transcript.language
        );
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_output_conversion() {
        let output = WhisperOutput {
            text: " hello world ".to_string(),
            segments: vec![
                WhisperSegment {
                    start: 0.0,
                    end: 1.2,
                    text: " hello ".to_string(),
                },
                WhisperSegment {
                    start: 1.2,
                    end: 2.4,
                    text: " world ".to_string(),
                },
            ],
            language: Some("en".to_string()),
        };

        let transcript: Transcript = output.into();
        assert_eq!(transcript.text, "hello world");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].text, "hello");
        assert_eq!(transcript.language, "en");
    }

    #[test]
    fn test_missing_language_defaults_to_empty() {
        let output = WhisperOutput {
            text: String::new(),
            segments: vec![],
            language: None,
        };
        let transcript: Transcript = output.into();
        assert_eq!(transcript.language, "");
    }
}
