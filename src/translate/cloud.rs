use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
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
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Hosted chat-completions backend. Requires an API key; credential
/// problems surface as `Credential` errors so callers can tell a bad
/// key apart from an ordinary translation failure.
#[derive(Debug)]
pub struct CloudTranslator {
    client: Client,
    endpoint: String,
    provider: String,
    model: String,
    api_key: String,
}

impl CloudTranslator {
    pub fn new(
        endpoint: String,
        provider: String,
        model: String,
        api_key: Option<&str>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => {
                return Err(AutocapError::Credential(
                    "API key is required for the cloud translation backend".to_string(),
                ))
            }
        };
        if api_key.chars().any(|c| c.is_whitespace() || !c.is_ascii()) {
            return Err(AutocapError::Credential(
                "API key is malformed: keys must be printable ASCII without spaces".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Ok(Self {
            client,
            endpoint,
            provider,
            model,
            api_key,
        })
    }

    fn system_prompt(&self, target_language: &str, glossary: &Glossary) -> String {
        let name = language_name(target_language);
        let mut prompt = format!(
            "You are a professional subtitle translator. Translate the user's text into {}.\n\
             Rules:\n\
             - Output ONLY the translation, no explanations or notes.\n\
             - Preserve line breaks exactly.\n\
             - Keep names, numbers and technical terms accurate.\n",
            name
        );
        if target_language.eq_ignore_ascii_case("en-gb")
            || target_language.eq_ignore_ascii_case("en-uk")
        {
            prompt.push_str("- Use British English spelling and phrasing.\n");
        }
        if let Some(block) = glossary_prompt_block(glossary) {
            prompt.push_str(&format!(
                "- Use these exact translations for glossary terms:\n{}\n",
                block
            ));
        }
        prompt
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        glossary: &Glossary,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.system_prompt(target_language, glossary),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        debug!("Sending cloud translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AutocapError::Translation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AutocapError::Credential(format!(
                "Cloud provider '{}' rejected the API key ({})",
                self.provider, status
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AutocapError::Translation(format!(
                "Cloud backend error {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AutocapError::Translation(format!("Failed to parse response: {}", e)))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AutocapError::Translation(
                "Empty translation received".to_string(),
            ));
        }
        Ok(content)
    }
}

#[async_trait]
impl Translator for CloudTranslator {
    async fn translate_batch(
        &self,
        segments: &[Segment],
        target_language: &str,
        glossary: &Glossary,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<TranslatedSegment>> {
        let backend_target = backend_language_tag(target_language);
        // Prompt still carries the regional variant for spelling rules.
        let prompt_target = if target_language.eq_ignore_ascii_case("en-gb")
            || target_language.eq_ignore_ascii_case("en-uk")
        {
            target_language.to_string()
        } else {
            backend_target
        };

        let total = segments.len();
        let mut translated = Vec::with_capacity(total);

        for (idx, segment) in segments.iter().enumerate() {
            let source_text = segment.text.trim();
            let text = if source_text.is_empty() {
                String::new()
            } else {
                match self
                    .translate_text(source_text, &prompt_target, glossary)
                    .await
                {
                    Ok(translation) => apply_glossary(&translation, glossary),
                    // A rejected key is never going to recover mid-batch.
                    Err(e) if e.is_credential() => return Err(e),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_translator(api_key: Option<&str>) -> Result<CloudTranslator> {
        CloudTranslator::new(
            "https://api.openai.com/v1".to_string(),
            "gpt".to_string(),
            "gpt-5-mini".to_string(),
            api_key,
        )
    }

    #[test]
    fn test_missing_key_is_credential_error() {
        let err = new_translator(None).unwrap_err();
        assert!(err.is_credential());
        let err = new_translator(Some("   ")).unwrap_err();
        assert!(err.is_credential());
    }

    #[test]
    fn test_malformed_key_is_credential_error() {
        let err = new_translator(Some("sk test key")).unwrap_err();
        assert!(err.is_credential());
        let err = new_translator(Some("sk-ключ")).unwrap_err();
        assert!(err.is_credential());
    }

    #[test]
    fn test_valid_key_accepted() {
        assert!(new_translator(Some("sk-test-123")).is_ok());
    }

    #[test]
    fn test_british_prompt_mentions_spelling() {
        let translator = new_translator(Some("sk-test-123")).unwrap();
        let prompt = translator.system_prompt("en-gb", &Glossary::new());
        assert!(prompt.contains("British English"));
        let prompt = translator.system_prompt("ja", &Glossary::new());
        assert!(!prompt.contains("British English"));
    }
}
