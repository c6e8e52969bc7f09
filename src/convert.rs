//! Chinese script conversion boundary.
//!
//! When a job resolves to a concrete Chinese variant, the transcribed
//! text is normalized to that script (the engine emits whichever
//! variant the audio happened to match). Conversion is best-effort:
//! when the converter tool is not installed the text passes through
//! unchanged.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ConvertConfig;
use crate::error::{AutocapError, Result};
use crate::lang::normalize_lang_code;

/// Direction of a Chinese script conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    TraditionalToSimplified,
    SimplifiedToTraditional,
}

impl Conversion {
    fn config_name(&self) -> &'static str {
        match self {
            Self::TraditionalToSimplified => "t2s.json",
            Self::SimplifiedToTraditional => "s2t.json",
        }
    }
}

/// Conversion needed to match the resolved source tag, if any. A
/// `zh-cn` source normalizes everything to Simplified, `zh-tw` to
/// Traditional; other languages need no conversion.
pub fn conversion_for(source_tag: &str) -> Option<Conversion> {
    match normalize_lang_code(source_tag).as_str() {
        "zh-cn" => Some(Conversion::TraditionalToSimplified),
        "zh-tw" => Some(Conversion::SimplifiedToTraditional),
        _ => None,
    }
}

/// Boundary trait for the external script conversion tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptConverter: Send + Sync {
    async fn convert(&self, text: &str, conversion: Conversion) -> Result<String>;

    /// Check that the conversion tool is installed and runnable.
    fn check_availability(&self) -> Result<()>;
}

/// Convert a batch of single-line texts in one tool invocation. The
/// lines travel newline-joined; a converter that does not give back
/// the same number of lines loses, and the originals are kept.
pub async fn convert_texts(
    converter: &dyn ScriptConverter,
    texts: &[String],
    conversion: Conversion,
) -> Result<Vec<String>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let joined = texts.join("\n");
    let converted = converter.convert(&joined, conversion).await?;
    let lines: Vec<String> = converted.lines().map(str::to_string).collect();
    if lines.len() == texts.len() {
        Ok(lines)
    } else {
        warn!(
            "Script conversion changed line count ({} -> {}), keeping original text",
            texts.len(),
            lines.len()
        );
        Ok(texts.to_vec())
    }
}

/// OpenCC CLI implementation.
pub struct OpenccConverter {
    config: ConvertConfig,
}

impl OpenccConverter {
    pub fn new(config: ConvertConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptConverter for OpenccConverter {
    async fn convert(&self, text: &str, conversion: Conversion) -> Result<String> {
        debug!("Converting script with {}", conversion.config_name());

        let mut child = Command::new(&self.config.binary_path)
            .arg("-c")
            .arg(conversion.config_name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AutocapError::Conversion(format!("Failed to execute conversion tool: {}", e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await.map_err(|e| {
                AutocapError::Conversion(format!("Failed to write converter input: {}", e))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|e| {
            AutocapError::Conversion(format!("Conversion tool failed: {}", e))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutocapError::Conversion(format!(
                "Conversion failed: {}",
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    fn check_availability(&self) -> Result<()> {
        let output = std::process::Command::new(&self.config.binary_path)
            .arg("--version")
            .output()
            .map_err(|e| {
                AutocapError::Conversion(format!("Conversion tool not found: {}", e))
            })?;

        if output.status.success() {
            debug!("Conversion tool is available");
            Ok(())
        } else {
            Err(AutocapError::Conversion(
                "Conversion tool version check failed".to_string(),
            ))
        }
    }
}

/// Factory for script converter instances.
pub struct ScriptConverterFactory;

impl ScriptConverterFactory {
    /// Create the default converter implementation (OpenCC CLI).
    pub fn create(config: ConvertConfig) -> Box<dyn ScriptConverter> {
        Box::new(OpenccConverter::new(config))
    }
}
