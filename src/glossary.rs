//! Glossary handling: parsing user-supplied term lists, deterministic
//! merging, the long-lived term store, and filename keyword inference
//! used to bias the transcription prompt.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AutocapError, Result};

/// Term -> preferred translation, case-sensitive exact keys. BTreeMap
/// keeps merge results deterministic for identical inputs.
pub type Glossary = BTreeMap<String, String>;

#[derive(Debug, Deserialize)]
struct GlossaryPair {
    term: String,
    #[serde(default)]
    translation: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GlossaryDocument {
    Map(BTreeMap<String, String>),
    Pairs(Vec<GlossaryPair>),
}

/// Parse line-based `term = translation` / `term -> translation` entries.
/// Blank lines and `#` comments are skipped; a missing translation keeps
/// the term itself.
pub fn parse_glossary_text(text: &str) -> Glossary {
    let mut result = Glossary::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (term, translation) = if let Some((term, translation)) = line.split_once("->") {
            (term, translation)
        } else if let Some((term, translation)) = line.split_once('=') {
            (term, translation)
        } else {
            continue;
        };
        let term = term.trim();
        let translation = translation.trim();
        if !term.is_empty() {
            let value = if translation.is_empty() { term } else { translation };
            result.insert(term.to_string(), value.to_string());
        }
    }
    result
}

/// Parse the structured form: either a JSON object of term -> translation
/// or a list of `{term, translation}` pairs.
pub fn parse_glossary_json(data: &str) -> Glossary {
    match serde_json::from_str::<GlossaryDocument>(data) {
        Ok(GlossaryDocument::Map(map)) => map
            .into_iter()
            .filter(|(term, _)| !term.trim().is_empty())
            .collect(),
        Ok(GlossaryDocument::Pairs(pairs)) => pairs
            .into_iter()
            .filter_map(|pair| {
                let term = pair.term.trim().to_string();
                if term.is_empty() {
                    return None;
                }
                let translation = pair.translation.trim();
                let value = if translation.is_empty() {
                    term.clone()
                } else {
                    translation.to_string()
                };
                Some((term, value))
            })
            .collect(),
        Err(e) => {
            warn!("Failed to parse glossary JSON, ignoring: {}", e);
            Glossary::new()
        }
    }
}

/// Parse a glossary file by extension: `.json` gets the structured form,
/// anything else the line-based form. A missing file is an empty glossary.
pub fn parse_glossary_file(path: &Path) -> Glossary {
    if !path.is_file() {
        return Glossary::new();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read glossary file {}: {}", path.display(), e);
            return Glossary::new();
        }
    };
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => parse_glossary_json(&content),
        _ => parse_glossary_text(&content),
    }
}

/// Merge glossary sources with later-overrides-earlier precedence on
/// exact term match. Deterministic and idempotent.
pub fn merge_glossaries(sources: &[&Glossary]) -> Glossary {
    let mut merged = Glossary::new();
    for source in sources {
        for (term, translation) in source.iter() {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let translation = translation.trim();
            let value = if translation.is_empty() { term } else { translation };
            merged.insert(term.to_string(), value.to_string());
        }
    }
    merged
}

const STOP_WORDS: &[&str] = &["final", "draft", "v1", "v2", "v3", "video", "audio", "sub", "subs"];

fn split_camel_case(chunk: &str) -> Vec<String> {
    let chars: Vec<char> = chunk.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    for (i, &ch) in chars.iter().enumerate() {
        if !current.is_empty() {
            let prev = chars[i - 1];
            let upper_run_ends = ch.is_uppercase()
                && prev.is_uppercase()
                && chars.get(i + 1).is_some_and(|next| next.is_lowercase());
            let lower_to_upper = (ch.is_uppercase() || ch.is_ascii_digit()) && prev.is_lowercase();
            if lower_to_upper || upper_run_ends {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Tokenize a file name into candidate proper-noun keywords: split on
/// non-word characters and camelCase boundaries, drop digits, short
/// tokens, and filler words, keep first-seen order without duplicates.
pub fn infer_terms_from_filename(filename: &str) -> Vec<String> {
    let base = Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());

    let mut terms = Vec::new();
    for chunk in base.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        for part in chunk.split('_').flat_map(|p| split_camel_case(p)) {
            let clean = part.trim();
            if clean.len() < 2 || clean.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if STOP_WORDS.contains(&clean.to_lowercase().as_str()) {
                continue;
            }
            if !terms.iter().any(|t: &String| t == clean) {
                terms.push(clean.to_string());
            }
        }
    }
    terms
}

/// Clean a keyword bag for prompt consumption: split on common
/// separators, strip quotes and markdown decoration, dedupe
/// case-insensitively, cap the count.
pub fn sanitize_keywords(text: &str, max_keywords: usize) -> String {
    let mut seen = Vec::new();
    let mut clean = Vec::new();
    for raw in text.split(['\n', ',', ';', '，']) {
        let keyword = raw
            .trim()
            .trim_matches(['"', '\'', '*', '-', '_'])
            .trim();
        if keyword.is_empty() {
            continue;
        }
        let lower = keyword.to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            clean.push(keyword.to_string());
        }
        if clean.len() >= max_keywords {
            break;
        }
    }
    clean.join(", ")
}

/// Build the transcription prompt from an optional user prompt plus
/// inferred keyword terms. Keyword biasing is independent of glossary
/// application during translation.
pub fn build_transcription_prompt(
    user_prompt: Option<&str>,
    keywords: &[String],
    max_keywords: usize,
) -> Option<String> {
    let keyword_bag = sanitize_keywords(&keywords.join(", "), max_keywords);
    match (user_prompt.map(str::trim).filter(|p| !p.is_empty()), keyword_bag.is_empty()) {
        (Some(prompt), true) => Some(prompt.to_string()),
        (Some(prompt), false) => Some(format!("{}\nKeywords: {}", prompt, keyword_bag)),
        (None, false) => Some(format!("Keywords: {}", keyword_bag)),
        (None, true) => None,
    }
}

/// Long-lived term store: one JSON file, loaded once at startup, mutated
/// only through `append`/`replace`, rewritten atomically so concurrent
/// readers never observe a partial file.
pub struct GlossaryStore {
    path: PathBuf,
    entries: RwLock<Glossary>,
}

impl GlossaryStore {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = if path.is_file() {
            match std::fs::read_to_string(&path) {
                Ok(content) => parse_glossary_json(&content),
                Err(e) => {
                    warn!("Failed to read glossary store {}: {}", path.display(), e);
                    Glossary::new()
                }
            }
        } else {
            Glossary::new()
        };
        debug!("Loaded glossary store with {} entries", entries.len());
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entries; jobs read a snapshot so an in-flight save never
    /// mutates a running merge.
    pub fn snapshot(&self) -> Glossary {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Merge new entries into the store and persist.
    pub fn append(&self, additions: &Glossary) -> Result<()> {
        let merged = {
            let entries = self
                .entries
                .read()
                .map_err(|_| AutocapError::Config("glossary store lock poisoned".to_string()))?;
            merge_glossaries(&[&entries, additions])
        };
        self.replace(merged)
    }

    /// Overwrite the store with exactly the given entries and persist.
    pub fn replace(&self, entries: Glossary) -> Result<()> {
        self.persist(&entries)?;
        let mut guard = self
            .entries
            .write()
            .map_err(|_| AutocapError::Config("glossary store lock poisoned".to_string()))?;
        *guard = entries;
        Ok(())
    }

    fn persist(&self, entries: &Glossary) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;

        // Atomic replace: write a sibling temp file, then rename over the
        // store so readers see either the old or the new version.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let content = serde_json::to_string_pretty(entries)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| AutocapError::Io(e.error))?;
        debug!("Persisted glossary store ({} entries)", entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glossary(pairs: &[(&str, &str)]) -> Glossary {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_text_both_separators() {
        let parsed = parse_glossary_text(
            "# comment\nGPU = 显卡\nattention -> 注意力\n\nbare line\nsolo =\n",
        );
        assert_eq!(parsed.get("GPU").map(String::as_str), Some("显卡"));
        assert_eq!(parsed.get("attention").map(String::as_str), Some("注意力"));
        assert_eq!(parsed.get("solo").map(String::as_str), Some("solo"));
        assert!(!parsed.contains_key("bare line"));
    }

    #[test]
    fn test_parse_json_map_and_pairs() {
        let from_map = parse_glossary_json(r#"{"GPU": "显卡"}"#);
        assert_eq!(from_map.get("GPU").map(String::as_str), Some("显卡"));

        let from_pairs =
            parse_glossary_json(r#"[{"term": "GPU", "translation": "显卡"}, {"term": "LoRA"}]"#);
        assert_eq!(from_pairs.get("GPU").map(String::as_str), Some("显卡"));
        assert_eq!(from_pairs.get("LoRA").map(String::as_str), Some("LoRA"));
    }

    #[test]
    fn test_merge_precedence_and_idempotence() {
        let saved = glossary(&[("GPU", "processor"), ("tensor", "张量")]);
        let request = glossary(&[("GPU", "显卡")]);
        let per_item = glossary(&[("tensor", "tensor-override")]);

        let merged = merge_glossaries(&[&saved, &request, &per_item]);
        assert_eq!(merged.get("GPU").map(String::as_str), Some("显卡"));
        assert_eq!(
            merged.get("tensor").map(String::as_str),
            Some("tensor-override")
        );

        let again = merge_glossaries(&[&saved, &request, &per_item]);
        assert_eq!(merged, again);
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let a = glossary(&[("GPU", "one")]);
        let b = glossary(&[("gpu", "two")]);
        let merged = merge_glossaries(&[&a, &b]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_infer_terms_from_filename() {
        let terms = infer_terms_from_filename("DeepLearning_lecture03_FINAL.v2.mp4");
        assert!(terms.contains(&"Deep".to_string()));
        assert!(terms.contains(&"Learning".to_string()));
        assert!(terms.contains(&"lecture".to_string()));
        assert!(!terms.iter().any(|t| t.eq_ignore_ascii_case("final")));
        assert!(!terms.iter().any(|t| t.eq_ignore_ascii_case("v2")));
        assert!(!terms.iter().any(|t| t == "03"));
    }

    #[test]
    fn test_sanitize_keywords() {
        let cleaned = sanitize_keywords("\"GPU\", *LoRA*, gpu, , attention", 10);
        assert_eq!(cleaned, "GPU, LoRA, attention");

        let capped = sanitize_keywords("a1, b2, c3", 2);
        assert_eq!(capped, "a1, b2");
    }

    #[test]
    fn test_build_transcription_prompt() {
        assert_eq!(build_transcription_prompt(None, &[], 10), None);
        assert_eq!(
            build_transcription_prompt(Some("lecture about CUDA"), &[], 10).as_deref(),
            Some("lecture about CUDA")
        );
        let combined = build_transcription_prompt(
            Some("lecture"),
            &["CUDA".to_string(), "LoRA".to_string()],
            10,
        );
        assert_eq!(combined.as_deref(), Some("lecture\nKeywords: CUDA, LoRA"));
    }

    #[test]
    fn test_store_append_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glossary.json");

        let store = GlossaryStore::load(&path);
        assert!(store.snapshot().is_empty());

        store.append(&glossary(&[("GPU", "显卡")])).unwrap();
        store.append(&glossary(&[("LoRA", "LoRA")])).unwrap();

        let reloaded = GlossaryStore::load(&path);
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("GPU").map(String::as_str), Some("显卡"));

        reloaded.replace(Glossary::new()).unwrap();
        assert!(GlossaryStore::load(&path).snapshot().is_empty());
    }
}
