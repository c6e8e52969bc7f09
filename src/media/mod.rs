// Audio extraction boundary.
//
// The pipeline only needs one operation from the media tool: turn a video
// input into an audio stream whisper can consume. The trait keeps the
// orchestrator testable without ffmpeg installed.

pub mod commands;
pub mod extractor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use extractor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Boundary trait for the external media tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Decode the audio track of a video file into `audio_path`.
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Check that the media tool is installed and runnable.
    fn check_availability(&self) -> Result<()>;

    /// Tool version string, for diagnostics.
    async fn version_info(&self) -> Result<String>;
}

/// Factory for media extractor instances.
pub struct MediaExtractorFactory;

impl MediaExtractorFactory {
    /// Create the default extractor implementation (ffmpeg-based).
    pub fn create(config: MediaConfig) -> Box<dyn MediaExtractor> {
        Box::new(extractor::FfmpegExtractor::new(config))
    }
}
