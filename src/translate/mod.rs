// Translation backends behind one capability trait.
//
// Two conforming implementations selected by configuration:
// - Local: lightweight local LLM endpoint, no credential, deterministic
// - Cloud: hosted chat-completions API, credentialed, provider-addressed
//
// Callers never branch on backend identity; the factory is the only
// place that knows which variant is in play.

pub mod cloud;
pub mod common;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use common::*;

use crate::config::TranslateConfig;
use crate::error::{AutocapError, Result};
use crate::glossary::Glossary;
use crate::subtitle::{Segment, TranslatedSegment};

/// Per-segment progress callback: (completed, total).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Capability contract shared by both backend variants.
#[async_trait]
pub trait Translator: Send + Sync + std::fmt::Debug {
    /// Translate segments to the target language, preserving order and
    /// count. Glossary terms are applied with exact-term priority over
    /// free translation. Individual segment failures keep the source
    /// text; transport and credential failures fail the batch.
    async fn translate_batch(
        &self,
        segments: &[Segment],
        target_language: &str,
        glossary: &Glossary,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<TranslatedSegment>>;

    /// Verify the backend is reachable before a batch starts.
    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// Backend selector, configurable per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationBackend {
    Local,
    Cloud,
}

impl std::str::FromStr for TranslationBackend {
    type Err = AutocapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            _ => Err(AutocapError::Config(format!(
                "Invalid translation backend '{}'. Valid backends: local, cloud",
                s
            ))),
        }
    }
}

/// Per-job backend overrides carried in the job options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendOverrides<'a> {
    pub backend: Option<TranslationBackend>,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
    pub api_key: Option<&'a str>,
}

/// Factory for translator instances.
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create a translator for the configured backend, honoring per-job
    /// overrides. Cloud credential validation happens here so a missing
    /// or malformed key surfaces before any segment is sent.
    pub fn create(
        config: &TranslateConfig,
        overrides: BackendOverrides<'_>,
    ) -> Result<Arc<dyn Translator>> {
        match overrides.backend.unwrap_or(config.backend) {
            TranslationBackend::Local => Ok(Arc::new(local::LocalTranslator::new(
                config.endpoint.clone(),
                config.model.clone(),
            ))),
            TranslationBackend::Cloud => {
                let provider = normalize_provider(
                    overrides.provider.unwrap_or(config.cloud.provider.as_str()),
                );
                let model = overrides
                    .model
                    .filter(|m| !m.trim().is_empty())
                    .map(str::to_string)
                    .or_else(|| {
                        (!config.cloud.model.trim().is_empty())
                            .then(|| config.cloud.model.clone())
                    })
                    .unwrap_or_else(|| default_cloud_model(&provider).to_string());
                let api_key = overrides
                    .api_key
                    .or(config.cloud.api_key.as_deref());
                let translator = cloud::CloudTranslator::new(
                    config.cloud.endpoint.clone(),
                    provider,
                    model,
                    api_key,
                )?;
                Ok(Arc::new(translator))
            }
        }
    }
}
