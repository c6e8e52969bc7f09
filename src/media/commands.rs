use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{AutocapError, Result};

/// Abstract media tool invocation.
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Execute the command, mapping failure stderr into an extraction error.
    pub async fn execute(&self) -> Result<()> {
        debug!(
            "Executing media command: {} {:?} ({})",
            self.binary_path, self.args, self.description
        );

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                AutocapError::Extraction(format!("Failed to execute media tool: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutocapError::Extraction(format!(
                "{} failed: {}",
                self.description, stderr
            )));
        }

        Ok(())
    }
}

/// Builder for the media operations the pipeline uses.
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Audio extraction in the format whisper expects: 16kHz mono PCM.
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .input(video_path)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(16000)
            .audio_channels(1)
            .overwrite()
            .output(audio_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_audio_command_shape() {
        let builder = MediaCommandBuilder::new("ffmpeg");
        let command = builder.extract_audio("in.mp4", "out.wav");
        assert_eq!(command.binary_path, "ffmpeg");
        assert_eq!(
            command.args,
            vec![
                "-i", "in.mp4", "-vn", "-c:a", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y",
                "out.wav"
            ]
        );
    }
}
