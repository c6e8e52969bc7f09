use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use super::{MediaCommandBuilder, MediaExtractor};
use crate::config::MediaConfig;
use crate::error::{AutocapError, Result};

/// FFmpeg-backed extractor.
pub struct FfmpegExtractor {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegExtractor {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);
        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaExtractor for FfmpegExtractor {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!(
            "Extracting audio from {} to {}",
            video_path.display(),
            audio_path.display()
        );

        if !video_path.exists() {
            return Err(AutocapError::FileNotFound(
                video_path.display().to_string(),
            ));
        }

        let command = self.command_builder.extract_audio(video_path, audio_path);
        command.execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| AutocapError::Extraction(format!("Media tool not found: {}", e)))?;

        if output.status.success() {
            debug!("Media tool is available");
            Ok(())
        } else {
            Err(AutocapError::Extraction(
                "Media tool version check failed".to_string(),
            ))
        }
    }

    async fn version_info(&self) -> Result<String> {
        let output = tokio::process::Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| AutocapError::Extraction(format!("Failed to execute media tool: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AutocapError::Extraction(format!(
                "Media tool version check failed: {}",
                stderr
            )))
        }
    }
}
