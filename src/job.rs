use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::glossary::Glossary;
use crate::translate::TranslationBackend;

pub type JobId = Uuid;

/// What kind of input the job starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Audio/video file: extract audio, transcribe, then translate.
    Media,
    /// Existing subtitle file: parse and translate only.
    Subtitle,
}

/// Job lifecycle states.
///
/// Pending and Paused are the only states a job can be dispatched from
/// or held in; Processing is exclusive (at most one job at a time);
/// Completed and Failed are terminal, though Failed jobs can be retried
/// back to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Paused,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Paused => "paused",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-job options captured at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    /// Requested source language, `auto` to detect.
    pub source_lang: String,
    /// Requested target language: `auto`, `none`, or a concrete tag.
    pub target_lang: String,
    /// Transcription model override.
    pub model: Option<String>,
    /// Extra transcription prompt text.
    pub prompt: Option<String>,
    /// Inline glossary text supplied with the request.
    pub glossary_text: Option<String>,
    /// Glossary file supplied with the request.
    pub glossary_file: Option<PathBuf>,
    /// Term additions for this job alone, highest merge precedence.
    #[serde(default)]
    pub glossary_terms: Glossary,
    /// Translation backend override.
    pub backend: Option<TranslationBackend>,
    /// Cloud provider override.
    pub provider: Option<String>,
    /// Cloud model override.
    pub provider_model: Option<String>,
    /// Cloud API key override.
    pub api_key: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            source_lang: "auto".to_string(),
            target_lang: "auto".to_string(),
            model: None,
            prompt: None,
            glossary_text: None,
            glossary_file: None,
            glossary_terms: Glossary::new(),
            backend: None,
            provider: None,
            provider_model: None,
            api_key: None,
        }
    }
}

/// An output file produced by a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Human-readable label, e.g. "Translated Subtitles (.srt)".
    pub label: String,
    /// Path on disk.
    pub path: PathBuf,
    /// Path relative to the transcripts directory, for display and
    /// download references.
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub input: PathBuf,
    pub status: JobStatus,
    pub options: JobOptions,
    pub artifacts: Vec<Artifact>,
    pub log_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, input: PathBuf, options: JobOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            input,
            status: JobStatus::Pending,
            options,
            artifacts: Vec::new(),
            log_path: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(
            JobKind::Media,
            PathBuf::from("lecture.mp4"),
            JobOptions::default(),
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.artifacts.is_empty());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_status_display_lowercase() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_default_options_are_auto() {
        let options = JobOptions::default();
        assert_eq!(options.source_lang, "auto");
        assert_eq!(options.target_lang, "auto");
    }
}
