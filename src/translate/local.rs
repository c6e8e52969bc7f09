use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    apply_glossary, backend_language_tag, glossary_prompt_block, language_name, ProgressFn,
    Translator,
};
use crate::error::{AutocapError, Result};
use crate::glossary::Glossary;
use crate::subtitle::{Segment, TranslatedSegment};

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TranslationPayload {
    text: String,
}

/// Local lightweight backend: an Ollama-compatible endpoint on this
/// machine. No credential, and temperature is pinned to zero so
/// identical input yields identical output.
#[derive(Debug)]
pub struct LocalTranslator {
    client: Client,
    endpoint: String,
    model: String,
}

impl LocalTranslator {
    pub fn new(endpoint: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint,
            model,
        }
    }

    fn build_prompt(&self, text: &str, target_language: &str, glossary: &Glossary) -> String {
        let name = language_name(target_language);
        let mut prompt = format!(
            "You are a professional translator.\n\
             \n\
             CRITICAL: You must translate the text to {} ONLY. Do not translate to any other language.\n\
             The target language is: {} (language code: {})\n\
             \n\
             Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
             Do not include any explanations, alternatives, or text in other languages.\n\
             Preserve line breaks exactly.\n",
            name, name, target_language, name
        );
        if let Some(block) = glossary_prompt_block(glossary) {
            prompt.push_str(&format!(
                "\nGlossary (term = preferred translation, follow it verbatim):\n{}\n",
                block
            ));
        }
        prompt.push_str(&format!("\nText to translate: \"{}\"\n", text));
        prompt
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        glossary: &Glossary,
    ) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: self.build_prompt(text, target_language, glossary),
            stream: false,
            format: "json".to_string(),
            options: GenerateOptions { temperature: 0.0 },
        };

        let url = format!("{}/api/generate", self.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AutocapError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AutocapError::Translation(format!(
                "Local backend error {}: {}",
                status, error_text
            )));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AutocapError::Translation(format!("Failed to parse response: {}", e)))?;

        let raw = generate_response.response.trim().to_string();
        if raw.is_empty() {
            return Err(AutocapError::Translation(
                "Empty translation received".to_string(),
            ));
        }

        if let Ok(payload) = serde_json::from_str::<TranslationPayload>(&raw) {
            return Ok(payload.text.trim().to_string());
        }
        Ok(raw)
    }
}

#[async_trait]
impl Translator for LocalTranslator {
    async fn translate_batch(
        &self,
        segments: &[Segment],
        target_language: &str,
        glossary: &Glossary,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<TranslatedSegment>> {
        let backend_target = backend_language_tag(target_language);
        let total = segments.len();
        let mut translated = Vec::with_capacity(total);

        for (idx, segment) in segments.iter().enumerate() {
            let source_text = segment.text.trim();
            let text = if source_text.is_empty() {
                // Keep empty segments so the dual variant stays in sync.
                String::new()
            } else {
                match self
                    .translate_text(source_text, &backend_target, glossary)
                    .await
                {
                    Ok(translation) => apply_glossary(&translation, glossary),
                    Err(e) => {
                        warn!("Failed to translate segment {}: {}", idx + 1, e);
                        source_text.to_string()
                    }
                }
            };

            translated.push(TranslatedSegment {
                start: segment.start,
                end: segment.end,
                text,
            });
            progress(idx + 1, total);
        }

        Ok(translated)
    }

    async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/api/show", self.endpoint);
        let request = json!({ "name": self.model });

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AutocapError::Translation(format!("Failed to connect to local backend: {}", e))
            })?;

        if response.status().is_success() {
            debug!("Local model '{}' is available", self.model);
            Ok(())
        } else {
            Err(AutocapError::Translation(format!(
                "Local model '{}' not found. Pull the model first: ollama pull {}",
                self.model, self.model
            )))
        }
    }
}
