use crate::glossary::Glossary;

/// Apply glossary substitutions to translated text, longest term first so
/// overlapping terms resolve deterministically. Exact-term matches take
/// priority over whatever the backend produced.
pub fn apply_glossary(text: &str, glossary: &Glossary) -> String {
    if glossary.is_empty() {
        return text.to_string();
    }
    let mut ordered: Vec<(&String, &String)> = glossary.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut updated = text.to_string();
    for (term, translation) in ordered {
        if term.is_empty() {
            continue;
        }
        updated = updated.replace(term.as_str(), translation);
    }
    updated
}

/// Language tag as the translation backends understand it. UK English is
/// a file-naming distinction only; backends get plain `en`.
pub fn backend_language_tag(tag: &str) -> String {
    let tag = tag.trim().to_lowercase();
    match tag.as_str() {
        "en-gb" | "en-uk" => "en".to_string(),
        _ => tag,
    }
}

/// Full language name for clearer prompts.
pub fn language_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "en" => "English".to_string(),
        "en-gb" | "en-uk" => "British English".to_string(),
        "zh" | "zh-cn" => "Simplified Chinese".to_string(),
        "zh-tw" => "Traditional Chinese".to_string(),
        "ja" => "Japanese".to_string(),
        "ko" => "Korean".to_string(),
        "ru" => "Russian".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "es" => "Spanish".to_string(),
        "it" => "Italian".to_string(),
        "pt" => "Portuguese".to_string(),
        "nl" => "Dutch".to_string(),
        "pl" => "Polish".to_string(),
        "tr" => "Turkish".to_string(),
        "ar" => "Arabic".to_string(),
        "hi" => "Hindi".to_string(),
        "th" => "Thai".to_string(),
        "vi" => "Vietnamese".to_string(),
        "uk" => "Ukrainian".to_string(),
        _ => code.to_string(),
    }
}

/// Render glossary entries as a prompt block, one `term = translation`
/// line per entry. Empty glossaries render as `None`.
pub fn glossary_prompt_block(glossary: &Glossary) -> Option<String> {
    if glossary.is_empty() {
        return None;
    }
    Some(
        glossary
            .iter()
            .map(|(term, translation)| format!("{} = {}", term, translation))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Normalize a provider identifier to its canonical family name.
pub fn normalize_provider(provider: &str) -> String {
    let p = provider.trim().to_lowercase();
    match p.as_str() {
        "gpt" | "openai" | "chatgpt" => "gpt".to_string(),
        "gemini" | "google" | "google-gemini" => "gemini".to_string(),
        _ if p.starts_with("gpt-") => "gpt".to_string(),
        _ => p,
    }
}

/// Default model per provider family.
pub fn default_cloud_model(provider: &str) -> &'static str {
    match provider {
        "gemini" => "gemini-3-flash",
        _ => "gpt-5-mini",
    }
}
