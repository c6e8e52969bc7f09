//! Language resolution heuristics.
//!
//! Requested codes may be explicit (`en`, `zh-cn`), `auto`, or - for the
//! target side - `none`. Auto resolution classifies a text sample by its
//! dominant character script; ambiguity never fails, it falls back to a
//! documented default (ambiguous Chinese is always Simplified).

use tracing::debug;

/// Dominant character script of a text sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Han,
    Kana,
    Hangul,
    Cyrillic,
    Latin,
    Unknown,
}

/// Resolved language pair for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Lowercase hyphenated source tag; "unknown" when undetectable
    pub source: String,
    /// Resolved target tag; `None` skips translation entirely
    pub target: Option<String>,
    /// False when there is no target or it matches the source
    pub translate: bool,
}

/// Classify a sample by counting characters per script range.
pub fn detect_script(text: &str) -> Script {
    let mut han = 0usize;
    let mut kana = 0usize;
    let mut hangul = 0usize;
    let mut cyrillic = 0usize;
    let mut latin = 0usize;

    for ch in text.chars() {
        let code = ch as u32;
        if (0x4E00..=0x9FFF).contains(&code) || (0x3400..=0x4DBF).contains(&code) {
            han += 1;
        } else if (0x3040..=0x30FF).contains(&code) {
            kana += 1;
        } else if (0xAC00..=0xD7AF).contains(&code) {
            hangul += 1;
        } else if (0x0400..=0x04FF).contains(&code) {
            cyrillic += 1;
        } else if ch.is_ascii_alphabetic() {
            latin += 1;
        }
    }

    let best = [
        (Script::Han, han),
        (Script::Kana, kana),
        (Script::Hangul, hangul),
        (Script::Cyrillic, cyrillic),
        (Script::Latin, latin),
    ]
    .into_iter()
    .max_by_key(|(_, count)| *count)
    .filter(|(_, count)| *count > 0);

    best.map(|(script, _)| script).unwrap_or(Script::Unknown)
}

/// Map a dominant script to a default language code. Han script resolves
/// to Simplified Chinese; there is no script-level signal for Traditional.
pub fn detect_language(text: &str) -> Option<&'static str> {
    match detect_script(text) {
        Script::Kana => Some("ja"),
        Script::Hangul => Some("ko"),
        Script::Han => Some("zh-cn"),
        Script::Cyrillic => Some("ru"),
        Script::Latin => Some("en"),
        Script::Unknown => None,
    }
}

/// Canonical code for same-language comparison. Chinese collapses into
/// zh-cn / zh-tw / zh buckets, English variants into `en`, everything
/// else into its primary subtag.
pub fn normalize_lang_code(code: &str) -> String {
    let code = code.trim().to_lowercase().replace('_', "-");
    if code.is_empty() {
        return String::new();
    }
    if code.starts_with("zh") {
        if code.contains("hant")
            || code.ends_with("-tw")
            || code.ends_with("-hk")
            || code.ends_with("-mo")
        {
            return "zh-tw".to_string();
        }
        if code.contains("hans") || code.ends_with("-cn") || code.ends_with("-sg") {
            return "zh-cn".to_string();
        }
        return "zh".to_string();
    }
    if code.starts_with("en") {
        return "en".to_string();
    }
    match code.split_once('-') {
        Some((primary, _)) => primary.to_string(),
        None => code,
    }
}

/// File-name form of a language code: lowercase, hyphenated, never empty.
pub fn format_lang_tag(code: &str) -> String {
    let tag = code.trim().replace('_', "-").to_lowercase();
    if tag.is_empty() {
        "unknown".to_string()
    } else {
        tag
    }
}

fn is_auto(code: &str) -> bool {
    let code = code.trim();
    code.is_empty() || code.eq_ignore_ascii_case("auto")
}

fn is_none(code: &str) -> bool {
    let code = code.trim();
    code.is_empty() || code.eq_ignore_ascii_case("none")
}

/// Smart target selection: English sources pair with Simplified Chinese,
/// everything else with UK English.
fn resolve_auto_target(source: &str) -> &'static str {
    if normalize_lang_code(source) == "en" {
        "zh-cn"
    } else {
        "en-gb"
    }
}

/// Resolve the effective (source, target) pair for one job.
///
/// `detected_hint` is the transcription engine's language guess, consulted
/// before script detection when the source request is `auto`. A detected
/// bare `zh` resolves to Simplified Chinese.
pub fn resolve_languages(
    source_req: &str,
    target_req: &str,
    detected_hint: Option<&str>,
    sample: &str,
) -> Resolution {
    let source = if is_auto(source_req) {
        let from_hint = detected_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty() && !hint.eq_ignore_ascii_case("auto"))
            .map(|hint| match normalize_lang_code(hint).as_str() {
                "zh" | "zh-cn" => "zh-cn".to_string(),
                _ => hint.to_string(),
            });
        match from_hint {
            Some(code) => code,
            None => detect_language(sample).unwrap_or("").to_string(),
        }
    } else {
        source_req.to_string()
    };

    let source_tag = format_lang_tag(&source);

    let target_tag = if is_none(target_req) {
        None
    } else if is_auto(target_req) {
        let target = resolve_auto_target(&source);
        debug!("Auto-selected target language: {}", target);
        Some(target.to_string())
    } else {
        Some(format_lang_tag(target_req))
    };

    let translate = match &target_tag {
        None => false,
        Some(target) => normalize_lang_code(target) != normalize_lang_code(&source),
    };

    Resolution {
        source: source_tag,
        target: target_tag,
        translate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_script() {
        assert_eq!(detect_script("hello there"), Script::Latin);
        assert_eq!(detect_script("你好世界"), Script::Han);
        assert_eq!(detect_script("こんにちは"), Script::Kana);
        assert_eq!(detect_script("안녕하세요"), Script::Hangul);
        assert_eq!(detect_script("Привет"), Script::Cyrillic);
        assert_eq!(detect_script("123 456"), Script::Unknown);
    }

    #[test]
    fn test_normalize_lang_code() {
        assert_eq!(normalize_lang_code("zh-CN"), "zh-cn");
        assert_eq!(normalize_lang_code("zh-Hant"), "zh-tw");
        assert_eq!(normalize_lang_code("zh-HK"), "zh-tw");
        assert_eq!(normalize_lang_code("zh"), "zh");
        assert_eq!(normalize_lang_code("en-GB"), "en");
        assert_eq!(normalize_lang_code("ja-JP"), "ja");
        assert_eq!(normalize_lang_code(""), "");
    }

    #[test]
    fn test_format_lang_tag() {
        assert_eq!(format_lang_tag("en_GB"), "en-gb");
        assert_eq!(format_lang_tag("zh-CN"), "zh-cn");
        assert_eq!(format_lang_tag(""), "unknown");
    }

    #[test]
    fn test_auto_source_english_pairs_with_simplified_chinese() {
        let resolution = resolve_languages("auto", "auto", None, "plain english speech");
        assert_eq!(resolution.source, "en");
        assert_eq!(resolution.target.as_deref(), Some("zh-cn"));
        assert!(resolution.translate);
    }

    #[test]
    fn test_auto_source_non_english_pairs_with_uk_english() {
        let resolution = resolve_languages("auto", "auto", None, "こんにちは、元気ですか");
        assert_eq!(resolution.source, "ja");
        assert_eq!(resolution.target.as_deref(), Some("en-gb"));
        assert!(resolution.translate);

        let resolution = resolve_languages("auto", "auto", None, "这是一个中文样本");
        assert_eq!(resolution.source, "zh-cn");
        assert_eq!(resolution.target.as_deref(), Some("en-gb"));
    }

    #[test]
    fn test_ambiguous_chinese_defaults_to_simplified() {
        // Han characters shared by both scripts carry no variant signal.
        let resolution = resolve_languages("auto", "auto", None, "你好世界");
        assert_eq!(resolution.source, "zh-cn");

        let resolution = resolve_languages("auto", "none", Some("zh"), "");
        assert_eq!(resolution.source, "zh-cn");
    }

    #[test]
    fn test_detected_hint_takes_priority_over_sample() {
        let resolution = resolve_languages("auto", "auto", Some("ko"), "latin looking text");
        assert_eq!(resolution.source, "ko");
        assert_eq!(resolution.target.as_deref(), Some("en-gb"));
    }

    #[test]
    fn test_target_none_skips_translation() {
        let resolution = resolve_languages("en", "none", None, "");
        assert_eq!(resolution.source, "en");
        assert_eq!(resolution.target, None);
        assert!(!resolution.translate);
    }

    #[test]
    fn test_explicit_codes_pass_through() {
        let resolution = resolve_languages("zh-TW", "en-GB", None, "");
        assert_eq!(resolution.source, "zh-tw");
        assert_eq!(resolution.target.as_deref(), Some("en-gb"));
        assert!(resolution.translate);
    }

    #[test]
    fn test_matching_target_disables_translation() {
        let resolution = resolve_languages("en-GB", "en", None, "");
        assert_eq!(resolution.target.as_deref(), Some("en"));
        assert!(!resolution.translate);
    }

    #[test]
    fn test_undetectable_source_is_unknown() {
        let resolution = resolve_languages("auto", "auto", None, "12345 67890");
        assert_eq!(resolution.source, "unknown");
        assert_eq!(resolution.target.as_deref(), Some("en-gb"));
    }
}
