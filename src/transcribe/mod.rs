// Speech-to-text boundary.
//
// One trait, one whisper CLI implementation. Only the input/output
// contract matters to the pipeline: audio in, ordered segments plus a
// detected-language hint out.

pub mod whisper;

use async_trait::async_trait;
use std::path::Path;

pub use whisper::*;

use crate::config::TranscriberConfig;
use crate::error::Result;
use crate::lang::normalize_lang_code;
use crate::subtitle::Segment;

/// Transcription output: full text, ordered segments, detected language.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<Segment>,
    pub language: String,
}

/// Per-call knobs: model override and prompt are per-job options, the
/// language hint comes from the job's source-language request.
#[derive(Debug, Clone, Default)]
pub struct TranscribeRequest {
    pub model: String,
    pub language: Option<String>,
    pub prompt: Option<String>,
}

/// Boundary trait for the external speech-to-text engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, audio_path: &Path, request: &TranscribeRequest)
        -> Result<Transcript>;
}

/// Collapse a requested language code into the primary-subtag form the
/// whisper CLI accepts (`zh-cn` becomes `zh`). `auto`/empty means let the
/// engine detect.
pub fn whisper_language_hint(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() || code.eq_ignore_ascii_case("auto") {
        return None;
    }
    let normalized = normalize_lang_code(code);
    if normalized.starts_with("zh") {
        return Some("zh".to_string());
    }
    Some(normalized)
}

/// Factory for transcription engine instances.
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create the default engine implementation (whisper CLI).
    pub fn create_default(config: TranscriberConfig) -> Box<dyn TranscriptionEngine> {
        Box::new(whisper::WhisperTranscriber::new(config))
    }
}
